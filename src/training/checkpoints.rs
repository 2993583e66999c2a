//! Checkpointing for VDNet training
//!
//! Each snapshot is a directory `<exp>/snapshots/epoch-<NNNN>/` holding:
//!
//! - `model.safetensors`: the model variables
//! - `optimizer.safetensors`: Adam moments keyed `m.<var>` / `v.<var>`
//! - `checkpoint.json`: the [`TrainingCheckpoint`] manifest, written last
//!
//! `<exp>/snapshots/latest.json` points at the newest snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use candle_core::Device;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::training::config::TrainingConfig;
use crate::training::optimizers::{Optimizer, OptimizerState, OptimizerStateDict};
use crate::training::schedulers::KlWeight;
use crate::vdnet::GenerativeModel;

const MANIFEST_FILE: &str = "checkpoint.json";
const MODEL_FILE: &str = "model.safetensors";
const OPTIMIZER_FILE: &str = "optimizer.safetensors";
const LATEST_FILE: &str = "latest.json";

/// Errors raised while reading or writing a checkpoint
#[derive(thiserror::Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint file not found: {path}")]
    Missing { path: PathBuf },

    #[error("Incompatible checkpoint: {reason}")]
    Incompatible { reason: String },

    #[error("Invalid checkpoint manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Training progress carried by a checkpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckpointProgress {
    /// Number of completed epochs
    pub epoch: usize,
    /// Global step after those epochs
    pub global_step: u64,
    /// KL weight to continue with
    pub kl_weight: KlWeight,
}

/// Checkpoint manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingCheckpoint {
    /// Number of completed epochs; training resumes at this epoch index
    pub epoch: usize,

    /// Global step after the completed epochs
    pub global_step: u64,

    /// KL weight in effect for the next epoch
    pub kl_weight: KlWeight,

    /// Optimizer metadata; moments live in `optimizer.safetensors`
    pub optimizer: OptimizerState,

    /// Model name
    pub model_name: String,

    /// Number of trainable scalars in the model
    pub num_parameters: usize,

    /// Run configuration
    pub config: TrainingConfig,

    /// Save time
    pub timestamp: DateTime<Utc>,

    /// Version of the writer
    pub version: String,
}

impl TrainingCheckpoint {
    /// Progress recorded in this checkpoint
    pub fn progress(&self) -> CheckpointProgress {
        CheckpointProgress {
            epoch: self.epoch,
            global_step: self.global_step,
            kl_weight: self.kl_weight,
        }
    }
}

/// Pointer to the newest snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LatestPointer {
    epoch: usize,
    snapshot: String,
}

/// Saves snapshots under an experiment directory and restores them
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    snapshot_dir: PathBuf,
}

impl CheckpointManager {
    /// Create a manager for `<experiment_dir>/snapshots`
    pub fn new<P: AsRef<Path>>(experiment_dir: P) -> Self {
        Self {
            snapshot_dir: experiment_dir.as_ref().join("snapshots"),
        }
    }

    /// Directory holding all snapshots
    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    /// Directory of the snapshot taken after `epoch` completed epochs
    pub fn checkpoint_path(&self, epoch: usize) -> PathBuf {
        self.snapshot_dir.join(format!("epoch-{:04}", epoch))
    }

    /// Persist model, optimizer and progress
    #[instrument(skip_all, fields(epoch = progress.epoch))]
    pub fn save<M, O>(
        &self,
        progress: CheckpointProgress,
        config: &TrainingConfig,
        model: &M,
        optimizer: &O,
    ) -> Result<TrainingCheckpoint>
    where
        M: GenerativeModel + ?Sized,
        O: Optimizer + ?Sized,
    {
        let dir = self.checkpoint_path(progress.epoch);
        self.write_snapshot(&dir, progress, config, model, optimizer)
            .map_err(|source| Error::CheckpointSave { path: dir.clone(), source })
    }

    fn write_snapshot<M, O>(
        &self,
        dir: &Path,
        progress: CheckpointProgress,
        config: &TrainingConfig,
        model: &M,
        optimizer: &O,
    ) -> std::result::Result<TrainingCheckpoint, CheckpointError>
    where
        M: GenerativeModel + ?Sized,
        O: Optimizer + ?Sized,
    {
        fs::create_dir_all(dir)?;

        model.var_map().save(dir.join(MODEL_FILE))?;

        let optimizer_state = optimizer.state_dict();
        optimizer_state.save_tensors(dir.join(OPTIMIZER_FILE))?;

        let checkpoint = TrainingCheckpoint {
            epoch: progress.epoch,
            global_step: progress.global_step,
            kl_weight: progress.kl_weight,
            optimizer: optimizer_state.state,
            model_name: model.name().to_string(),
            num_parameters: model.num_parameters(),
            config: config.clone(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        fs::write(dir.join(MANIFEST_FILE), serde_json::to_string_pretty(&checkpoint)?)?;

        let pointer = LatestPointer {
            epoch: progress.epoch,
            snapshot: dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        fs::write(
            self.snapshot_dir.join(LATEST_FILE),
            serde_json::to_string_pretty(&pointer)?,
        )?;

        info!(
            "Saved checkpoint for epoch {} (step {}) to {}",
            progress.epoch,
            progress.global_step,
            dir.display()
        );
        Ok(checkpoint)
    }

    /// Newest snapshot directory recorded in `latest.json`
    pub fn latest(&self) -> std::result::Result<Option<PathBuf>, CheckpointError> {
        let pointer_path = self.snapshot_dir.join(LATEST_FILE);
        if !pointer_path.is_file() {
            return Ok(None);
        }
        let pointer: LatestPointer = serde_json::from_str(&fs::read_to_string(pointer_path)?)?;
        Ok(Some(self.snapshot_dir.join(pointer.snapshot)))
    }

    /// All snapshot directories, oldest first
    pub fn list(&self) -> std::result::Result<Vec<PathBuf>, CheckpointError> {
        if !self.snapshot_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut snapshots: Vec<PathBuf> = fs::read_dir(&self.snapshot_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.join(MANIFEST_FILE).is_file())
            .collect();
        snapshots.sort();
        Ok(snapshots)
    }

    /// Restore model and optimizer from a checkpoint
    ///
    /// `path` may be a snapshot directory, its `checkpoint.json`, or a
    /// snapshots directory holding `latest.json`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load<P, M, O>(path: P, model: &mut M, optimizer: &mut O) -> Result<TrainingCheckpoint>
    where
        P: AsRef<Path>,
        M: GenerativeModel + ?Sized,
        O: Optimizer + ?Sized,
    {
        let path = path.as_ref();
        read_snapshot(path, model, optimizer).map_err(|source| Error::CheckpointLoad {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn resolve_snapshot_dir(path: &Path) -> std::result::Result<PathBuf, CheckpointError> {
    if path.is_file() {
        return Ok(path.parent().map(Path::to_path_buf).unwrap_or_default());
    }
    if path.join(MANIFEST_FILE).is_file() {
        return Ok(path.to_path_buf());
    }
    if path.join(LATEST_FILE).is_file() {
        let pointer: LatestPointer = serde_json::from_str(&fs::read_to_string(path.join(LATEST_FILE))?)?;
        return Ok(path.join(pointer.snapshot));
    }
    Err(CheckpointError::Missing {
        path: path.to_path_buf(),
    })
}

fn require(path: PathBuf) -> std::result::Result<PathBuf, CheckpointError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(CheckpointError::Missing { path })
    }
}

fn read_snapshot<M, O>(
    path: &Path,
    model: &mut M,
    optimizer: &mut O,
) -> std::result::Result<TrainingCheckpoint, CheckpointError>
where
    M: GenerativeModel + ?Sized,
    O: Optimizer + ?Sized,
{
    let dir = resolve_snapshot_dir(path)?;
    let manifest = require(dir.join(MANIFEST_FILE))?;
    let model_file = require(dir.join(MODEL_FILE))?;
    let optimizer_file = require(dir.join(OPTIMIZER_FILE))?;

    let checkpoint: TrainingCheckpoint = serde_json::from_str(&fs::read_to_string(&manifest)?)?;
    debug!(
        "Checkpoint manifest: epoch {}, step {}, written by {}",
        checkpoint.epoch, checkpoint.global_step, checkpoint.version
    );

    if checkpoint.model_name != model.name() {
        return Err(CheckpointError::Incompatible {
            reason: format!(
                "checkpoint holds a '{}' model, expected '{}'",
                checkpoint.model_name,
                model.name()
            ),
        });
    }
    if checkpoint.num_parameters != model.num_parameters() {
        return Err(CheckpointError::Incompatible {
            reason: format!(
                "checkpoint has {} parameters, model has {}",
                checkpoint.num_parameters,
                model.num_parameters()
            ),
        });
    }

    model.var_map_mut().load(&model_file)?;

    let device = model
        .var_map()
        .all_vars()
        .first()
        .map(|var| var.device().clone())
        .unwrap_or(Device::Cpu);
    let state = OptimizerStateDict::load(checkpoint.optimizer.clone(), &optimizer_file, &device)?;
    optimizer.load_state_dict(state)?;

    info!(
        "Restored checkpoint from {}: epoch {}, step {}, kl weight {}",
        dir.display(),
        checkpoint.epoch,
        checkpoint.global_step,
        checkpoint.kl_weight
    );
    Ok(checkpoint)
}
