//! Training configuration for VDNet runs
//!
//! A [`TrainingConfig`] is built from defaults, an optional JSON/YAML file and
//! command-line overrides, then validated once before training starts. The
//! whole config is stored in every checkpoint.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::VdnetConfig;
use crate::error::{Error, Result};
use crate::training::data::{DataLoaderConfig, Split};
use crate::training::optimizers::AdamConfig;
use crate::training::schedulers::{KlWeight, KlWeightScheduler};

/// Main training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Experiment naming and location
    pub experiment: ExperimentConfig,

    /// Model architecture
    pub model: VdnetConfig,

    /// Dataset location and batching
    pub data: DataConfig,

    /// Optimizer hyper-parameters
    pub optimizer: AdamConfig,

    /// KL-weight schedule
    pub kl: KlConfig,

    /// Epoch loop parameters
    pub training: TrainingParams,

    /// Device and randomness
    pub runtime: RuntimeConfig,
}

/// Experiment naming and location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Experiment name, the directory under `root`
    pub name: String,

    /// Root directory holding all experiments
    pub root: PathBuf,

    /// Checkpoint to resume from
    pub resume: Option<PathBuf>,
}

/// Dataset location and batching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding `train.safetensors` and `test.safetensors`
    pub path: PathBuf,

    /// Batch size
    pub batch_size: usize,

    /// Number of loading workers
    pub num_workers: usize,

    /// Batches prefetched per worker
    pub prefetch_factor: usize,

    /// Shuffle both splits every epoch
    pub shuffle: bool,

    /// Drop the last incomplete training batch
    pub drop_last: bool,
}

/// KL-weight schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KlConfig {
    /// Weight of the KL term at the start of a fresh run
    pub initial_weight: f64,

    /// Test reconstruction loss below which the weight may double; `None` disables
    pub target_loss: Option<f64>,

    /// Ceiling for the weight; `None` means unbounded
    pub max_weight: Option<f64>,
}

/// Epoch loop parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    /// Total number of epochs
    pub num_epochs: usize,

    /// Checkpoint and visualize every N epochs; 0 disables both
    pub snapshot_interval: usize,

    /// Prior samples drawn per visualization
    pub num_prior_samples: usize,

    /// Show progress bars
    pub progress_bar: bool,
}

/// Device selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Always run on the CPU
    Cpu,
    /// CUDA device, failing if unavailable
    Cuda,
    /// Metal device, failing if unavailable
    Metal,
    /// CUDA if available, otherwise CPU
    Auto,
}

/// Device and randomness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Device type
    pub device_type: DeviceType,

    /// Accelerator ordinal
    pub device_id: usize,

    /// Seed for data shuffling; random when unset
    pub seed: Option<u64>,
}

impl TrainingConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON or YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let config = if is_json(path) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content).map_err(|e| {
                Error::config(format!("Failed to parse YAML configuration {}: {}", path.display(), e))
            })?
        };

        Ok(config)
    }

    /// Save configuration as JSON or YAML, chosen by extension
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)
                .map_err(|e| Error::config(format!("Failed to serialize configuration to YAML: {}", e)))?
        };

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.experiment.name.trim().is_empty() {
            return Err(Error::config("Experiment name must not be empty"));
        }

        self.model.validate()?;

        if self.data.batch_size == 0 {
            return Err(Error::config("Batch size must be greater than 0"));
        }
        if self.data.prefetch_factor == 0 {
            return Err(Error::config("Prefetch factor must be greater than 0"));
        }

        self.optimizer.validate()?;

        let scheduler = self.kl_scheduler()?;
        scheduler.check_initial(self.initial_kl_weight()?)?;

        if self.training.num_epochs == 0 {
            return Err(Error::config("Number of epochs must be greater than 0"));
        }
        if self.training.num_prior_samples == 0 {
            return Err(Error::config("Number of prior samples must be greater than 0"));
        }

        Ok(())
    }

    /// Directory of this experiment
    pub fn experiment_dir(&self) -> PathBuf {
        self.experiment.root.join(&self.experiment.name)
    }

    /// Initial KL weight
    pub fn initial_kl_weight(&self) -> Result<KlWeight> {
        KlWeight::new(self.kl.initial_weight)
    }

    /// KL-weight scheduler described by this config
    pub fn kl_scheduler(&self) -> Result<KlWeightScheduler> {
        KlWeightScheduler::new(self.kl.target_loss, self.kl.max_weight())
    }

    /// Loader settings for one split
    ///
    /// Only the training split drops an incomplete last batch; the test pass
    /// always covers every sample.
    pub fn loader_config(&self, split: Split) -> DataLoaderConfig {
        DataLoaderConfig {
            batch_size: self.data.batch_size,
            shuffle: self.data.shuffle,
            num_workers: self.data.num_workers,
            prefetch_factor: self.data.prefetch_factor,
            drop_last: split == Split::Train && self.data.drop_last,
            seed: self.runtime.seed.map(|seed| seed.wrapping_add(split as u64)),
        }
    }

    /// Whether the given 0-based epoch ends with a checkpoint and visualization
    pub fn is_snapshot_epoch(&self, epoch: usize) -> bool {
        let interval = self.training.snapshot_interval;
        interval != 0 && (epoch + 1) % interval == 0
    }
}

impl KlConfig {
    /// Ceiling as a number, infinite when unset
    pub fn max_weight(&self) -> f64 {
        self.max_weight.unwrap_or(f64::INFINITY)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("json")
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            experiment: ExperimentConfig::default(),
            model: VdnetConfig::default(),
            data: DataConfig::default(),
            optimizer: AdamConfig::default(),
            kl: KlConfig::default(),
            training: TrainingParams::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            root: PathBuf::from("exp"),
            resume: None,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/motion"),
            batch_size: 8,
            num_workers: 8,
            prefetch_factor: 2,
            shuffle: true,
            drop_last: false,
        }
    }
}

impl Default for KlConfig {
    fn default() -> Self {
        Self {
            initial_weight: 1e-5,
            target_loss: Some(10.0),
            max_weight: None,
        }
    }
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            num_epochs: 1024,
            snapshot_interval: 1,
            num_prior_samples: 4,
            progress_bar: true,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            device_type: DeviceType::Auto,
            device_id: 0,
            seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = TrainingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.experiment_dir(), PathBuf::from("exp/default"));
        assert_eq!(config.kl.max_weight(), f64::INFINITY);
    }

    #[test]
    fn test_config_serialization() {
        let config = TrainingConfig::default();

        let json_str = serde_json::to_string(&config).unwrap();
        let deserialized: TrainingConfig = serde_json::from_str(&json_str).unwrap();
        assert_eq!(config, deserialized);

        let yaml_str = serde_yaml::to_string(&config).unwrap();
        let deserialized: TrainingConfig = serde_yaml::from_str(&yaml_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: TrainingConfig =
            serde_yaml::from_str("data:\n  batch_size: 32\nkl:\n  target_loss: null\n").unwrap();
        assert_eq!(config.data.batch_size, 32);
        assert_eq!(config.data.num_workers, 8);
        assert_eq!(config.kl.target_loss, None);
        assert_eq!(config.training.num_epochs, 1024);
    }

    #[test]
    fn test_config_file_operations() {
        let dir = TempDir::new().unwrap();
        let mut config = TrainingConfig::default();
        config.training.num_epochs = 3;

        let json_path = dir.path().join("config.json");
        config.to_file(&json_path).unwrap();
        assert_eq!(TrainingConfig::from_file(&json_path).unwrap(), config);

        let yaml_path = dir.path().join("config.yaml");
        config.to_file(&yaml_path).unwrap();
        assert_eq!(TrainingConfig::from_file(&yaml_path).unwrap(), config);
    }

    #[test]
    fn test_config_validation() {
        let mut config = TrainingConfig::default();
        config.data.batch_size = 0;
        assert!(config.validate().is_err());

        config = TrainingConfig::default();
        config.optimizer.learning_rate = -0.1;
        assert!(config.validate().is_err());

        config = TrainingConfig::default();
        config.training.num_epochs = 0;
        assert!(config.validate().is_err());

        config = TrainingConfig::default();
        config.kl.initial_weight = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_initial_weight_above_ceiling_rejected() {
        let mut config = TrainingConfig::default();
        config.kl.initial_weight = 1e-3;
        config.kl.max_weight = Some(1e-4);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_snapshot_epochs() {
        let mut config = TrainingConfig::default();
        config.training.snapshot_interval = 3;
        let epochs: Vec<usize> = (0..9).filter(|&e| config.is_snapshot_epoch(e)).collect();
        assert_eq!(epochs, vec![2, 5, 8]);

        config.training.snapshot_interval = 0;
        assert!((0..9).all(|e| !config.is_snapshot_epoch(e)));
    }

    #[test]
    fn test_loader_config() {
        let mut config = TrainingConfig::default();
        config.runtime.seed = Some(3);
        config.data.shuffle = false;
        config.data.drop_last = true;

        let train = config.loader_config(Split::Train);
        assert_eq!(train.batch_size, 8);
        assert!(train.drop_last);
        assert!(!train.shuffle);
        assert_eq!(train.seed, Some(3));
        assert_eq!(config.loader_config(Split::Test).seed, Some(4));

        assert!(!config.loader_config(Split::Test).drop_last);
    }
}
