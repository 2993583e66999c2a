//! Summary logging for VDNet training
//!
//! The trainer reports through the [`SummaryWriter`] trait: scalar summaries
//! (`train_loss`, `test_loss_r`, `kl_weight`, ...) and image summaries (input,
//! output and prior-sample grids), each tagged with the global step.
//!
//! - [`FileSummaryWriter`] persists summaries under the experiment directory
//! - [`MemorySummaryWriter`] keeps them in memory for inspection
//! - [`LossAccumulator`] turns per-batch losses into sample-weighted averages

pub mod aggregators;
pub mod collectors;
pub mod exporters;

pub use aggregators::{LossAccumulator, WeightedMean};
pub use collectors::{CapturedImages, MemorySummaryWriter};
pub use exporters::FileSummaryWriter;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Sink for scalar and image summaries
#[async_trait]
pub trait SummaryWriter: Send {
    /// Writer name
    fn name(&self) -> &str;

    /// Record a scalar value at `step`
    async fn scalar_summary(&mut self, tag: &str, value: f64, step: u64) -> Result<()>;

    /// Record a group of images at `step`
    async fn image_summary(&mut self, tag: &str, images: &[RgbImage], step: u64) -> Result<()>;

    /// Flush buffered records
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One scalar summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    /// Summary tag
    pub tag: String,
    /// Scalar value
    pub value: f64,
    /// Global step
    pub step: u64,
    /// Time of recording
    pub wall_time: DateTime<Utc>,
}

/// One image summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Summary tag
    pub tag: String,
    /// Global step
    pub step: u64,
    /// Number of images in the group
    pub count: usize,
    /// Files written for the group, relative to the log directory
    pub files: Vec<String>,
    /// Time of recording
    pub wall_time: DateTime<Utc>,
}
