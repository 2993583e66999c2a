//! Training infrastructure for VDNet models
//!
//! This module provides the pieces of a VDNet training run: data loading,
//! the loss evaluator, the adaptive KL-weight scheduler, a checkpointable
//! optimizer, snapshots, summary logging and visualization, and the
//! [`VdnetTrainer`] driver that ties them together.
//!
//! # Main Components
//!
//! - **Configuration**: [`TrainingConfig`], loadable from JSON or YAML
//! - **Trainer**: the epoch-loop state machine
//! - **Data**: datasets and the prefetching loader
//! - **Loss**: reconstruction and KL terms
//! - **Schedulers**: KL-weight doubling
//! - **Checkpoints**: snapshot save and restore
//! - **Metrics**: scalar and image summaries
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vdnet_train::training::{FileSummaryWriter, MotionDataset, Split, TrainingConfig, VdnetTrainer};
//! use vdnet_train::vdnet::VDNet;
//! use candle_core::Device;
//!
//! let config = TrainingConfig::default();
//! let train = Arc::new(MotionDataset::open(&config.data.path, Split::Train)?);
//! let test = Arc::new(MotionDataset::open(&config.data.path, Split::Test)?);
//! let model = VDNet::new(config.model.clone(), &Device::Cpu)?;
//! let writer = FileSummaryWriter::create(config.experiment_dir().join("logs")).await?;
//!
//! let mut trainer = VdnetTrainer::new(config, model, train, test, Box::new(writer), Device::Cpu)?;
//! let result = trainer.train().await?;
//! ```

pub mod checkpoints;
pub mod config;
pub mod data;
pub mod loss;
pub mod metrics;
pub mod optimizers;
pub mod progress;
pub mod schedulers;
pub mod trainer;
pub mod visualize;

// Tests module
#[cfg(test)]
pub mod tests;

// Configuration re-exports
pub use config::{
    DataConfig, DeviceType, ExperimentConfig, KlConfig, RuntimeConfig, TrainingConfig,
    TrainingParams,
};

// Trainer re-exports
pub use trainer::{
    EpochSummary, TrainingEvent, TrainingPhase, TrainingResult, TrainingState, VdnetTrainer,
};

// Data re-exports
pub use data::{Batch, DataError, DataLoader, DataLoaderConfig, Dataset, MotionDataset, Split};

// Checkpoint re-exports
pub use checkpoints::{CheckpointError, CheckpointManager, CheckpointProgress, TrainingCheckpoint};

// Metrics re-exports
pub use metrics::{FileSummaryWriter, LossAccumulator, MemorySummaryWriter, SummaryWriter};

// Optimizer re-exports
pub use optimizers::{Adam, AdamConfig, Optimizer, OptimizerState};

// Loss re-exports
pub use loss::{LossState, VdnetLoss};

// Scheduler re-exports
pub use schedulers::{KlWeight, KlWeightScheduler, KlWeightUpdate};
