//! vdnet-train - Training pipeline for VDNet variational motion-transfer models
//!
//! This crate trains a conditional VAE that maps an input frame to a target
//! frame through a latent motion code. Training minimizes
//! `reconstruction + kl_weight * kl`, where the KL weight starts small and
//! doubles whenever the test reconstruction loss is low enough.

#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod error;
pub mod logging;
pub mod training;
pub mod utils;
pub mod vdnet;

// Re-exports
pub use config::VdnetConfig;
pub use error::{Error, Result};
pub use training::{
    CheckpointManager, FileSummaryWriter, KlWeight, KlWeightScheduler, MotionDataset, Split,
    TrainingConfig, TrainingResult, VdnetTrainer,
};
pub use vdnet::{ForwardMode, GenerativeModel, ModelOutput, VDNet};
