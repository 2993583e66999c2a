//! Error types for the VDNet training pipeline
//!
//! Every error is fatal to the current run. Checkpoint failures are split into
//! load and save variants so a bad resume path can be told apart from a
//! failed snapshot write.

use std::path::PathBuf;

use thiserror::Error;

use crate::training::checkpoints::CheckpointError;
use crate::training::data::DataError;

/// Main error type for VDNet training operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dataset or data loader error
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Failed to restore a checkpoint on resume
    #[error("Failed to load checkpoint from {path}: {source}")]
    CheckpointLoad {
        path: PathBuf,
        #[source]
        source: CheckpointError,
    },

    /// Failed to persist a checkpoint
    #[error("Failed to save checkpoint to {path}: {source}")]
    CheckpointSave {
        path: PathBuf,
        #[source]
        source: CheckpointError,
    },

    /// Tensor computation error (forward, backward or optimizer update)
    #[error("Compute error: {0}")]
    Compute(#[from] candle_core::Error),

    /// Summary logger error
    #[error("Logging error: {0}")]
    Logging(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for VDNet training operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a logging error
    pub fn logging(msg: impl Into<String>) -> Self {
        Self::Logging(msg.into())
    }

    /// Whether this error came from restoring a checkpoint
    pub fn is_checkpoint_load(&self) -> bool {
        matches!(self, Self::CheckpointLoad { .. })
    }

    /// Whether this error came from writing a checkpoint
    pub fn is_checkpoint_save(&self) -> bool {
        matches!(self, Self::CheckpointSave { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_errors_are_distinguishable() {
        let load = Error::CheckpointLoad {
            path: PathBuf::from("exp/a/snapshots/epoch-0001"),
            source: CheckpointError::Missing { path: PathBuf::from("checkpoint.json") },
        };
        let save = Error::CheckpointSave {
            path: PathBuf::from("exp/a/snapshots/epoch-0001"),
            source: CheckpointError::Missing { path: PathBuf::from("model.safetensors") },
        };

        assert!(load.is_checkpoint_load());
        assert!(!load.is_checkpoint_save());
        assert!(save.is_checkpoint_save());
        assert!(!save.is_checkpoint_load());
        assert!(load.to_string().starts_with("Failed to load checkpoint"));
    }

    #[test]
    fn test_config_error_message() {
        let err = Error::config("batch size must be greater than 0");
        assert_eq!(err.to_string(), "Configuration error: batch size must be greater than 0");
    }
}
