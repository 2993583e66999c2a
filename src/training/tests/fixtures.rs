//! Test fixtures for setting up trainer runs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use super::mock_data::create_mock_dataset;
use super::test_utils::{create_test_config, create_test_device, create_test_model};
use crate::training::config::TrainingConfig;
use crate::training::data::{MotionDataset, Split};
use crate::training::metrics::MemorySummaryWriter;
use crate::training::trainer::VdnetTrainer;
use crate::vdnet::VDNet;

/// Scratch experiment with in-memory summaries
pub struct TrainingTestFixture {
    pub temp_dir: TempDir,
    pub config: TrainingConfig,
    pub train: Arc<MotionDataset>,
    pub test: Arc<MotionDataset>,
    pub writer: MemorySummaryWriter,
}

impl TrainingTestFixture {
    /// Fixture with `train_samples` training and `test_samples` test samples
    pub fn new(train_samples: usize, test_samples: usize) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config = create_test_config(temp_dir.path());

        Self {
            config,
            train: create_mock_dataset(train_samples, Split::Train),
            test: create_mock_dataset(test_samples, Split::Test),
            writer: MemorySummaryWriter::new(),
            temp_dir,
        }
    }

    /// Root of the scratch directory
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Experiment directory of the current config
    pub fn experiment_dir(&self) -> PathBuf {
        self.config.experiment_dir()
    }

    /// Trainer over a fresh model that writes into this fixture's writer
    pub fn create_trainer(&self) -> VdnetTrainer<VDNet, MotionDataset> {
        self.create_trainer_with(self.config.clone(), self.writer.clone())
    }

    /// Trainer with an explicit config and writer
    pub fn create_trainer_with(
        &self,
        config: TrainingConfig,
        writer: MemorySummaryWriter,
    ) -> VdnetTrainer<VDNet, MotionDataset> {
        let model = create_test_model(&config);
        VdnetTrainer::new(
            config,
            model,
            self.train.clone(),
            self.test.clone(),
            Box::new(writer),
            create_test_device(),
        )
        .unwrap()
    }
}
