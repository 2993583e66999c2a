//! Data loading infrastructure for VDNet training
//!
//! This module provides the dataset abstraction, the motion dataset backed by
//! safetensors split files, batch collation, and the prefetching data loader.

use std::fmt;

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

pub mod batching;
pub mod datasets;
pub mod loaders;

// Re-exports
pub use batching::{collate, Batch};
pub use datasets::MotionDataset;
pub use loaders::{DataLoader, DataLoaderConfig, DataLoaderStream};

/// Common trait for all training datasets
pub trait Dataset: Send + Sync {
    /// Get the number of samples in the dataset
    fn len(&self) -> usize;

    /// Check if the dataset is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a sample by index
    fn get(&self, index: usize) -> Result<Sample, DataError>;

    /// Get a collated batch for the given indices
    fn get_batch(&self, indices: &[usize]) -> Result<Batch, DataError> {
        let samples = indices
            .iter()
            .map(|&index| self.get(index))
            .collect::<Result<Vec<_>, _>>()?;
        collate(samples)
    }

    /// Get dataset metadata
    fn metadata(&self) -> &DatasetMetadata;
}

/// A single `(input, target)` pair, each `[channels, height, width]`
#[derive(Debug, Clone)]
pub struct Sample {
    /// Input frame
    pub input: Tensor,
    /// Target frame
    pub target: Tensor,
}

/// Dataset split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Training split
    Train,
    /// Held-out test split
    Test,
}

impl Split {
    /// Both splits, in the order they are processed
    pub const ALL: [Split; 2] = [Split::Train, Split::Test];

    /// Lowercase split name, also the file stem on disk
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dataset metadata
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetMetadata {
    /// Dataset name/identifier
    pub name: String,
    /// Split this dataset serves
    pub split: Split,
    /// Number of samples
    pub num_samples: usize,
    /// Shape of one input sample
    pub input_shape: [usize; 3],
    /// Shape of one target sample
    pub target_shape: [usize; 3],
}

/// Error types for data loading
#[derive(thiserror::Error, Debug)]
pub enum DataError {
    #[error("Dataset not found: {path}")]
    DatasetNotFound { path: String },

    #[error("Missing tensor '{name}' in {path}")]
    MissingTensor { name: String, path: String },

    #[error("Invalid sample index: {index} >= {dataset_size}")]
    InvalidIndex { index: usize, dataset_size: usize },

    #[error("Malformed data: {reason}")]
    MalformedData { reason: String },

    #[error("Batch collation error: {reason}")]
    BatchCollation { reason: String },

    #[error("Loader worker failed: {reason}")]
    WorkerFailed { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}
