//! In-memory summary collection

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use image::RgbImage;
use parking_lot::Mutex;

use super::{ScalarRecord, SummaryWriter};
use crate::error::Result;

/// Image group captured by [`MemorySummaryWriter`]
#[derive(Debug, Clone)]
pub struct CapturedImages {
    /// Summary tag
    pub tag: String,
    /// Global step
    pub step: u64,
    /// The images
    pub images: Vec<RgbImage>,
}

#[derive(Debug, Default)]
struct Captured {
    scalars: Vec<ScalarRecord>,
    images: Vec<CapturedImages>,
}

/// Summary writer that keeps everything in memory
///
/// Clones share the same storage, so a handle kept outside the trainer sees
/// everything the trainer wrote.
#[derive(Debug, Clone, Default)]
pub struct MemorySummaryWriter {
    captured: Arc<Mutex<Captured>>,
}

impl MemorySummaryWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// All scalar records in write order
    pub fn scalars(&self) -> Vec<ScalarRecord> {
        self.captured.lock().scalars.clone()
    }

    /// `(step, value)` pairs recorded for `tag`
    pub fn scalar_series(&self, tag: &str) -> Vec<(u64, f64)> {
        self.captured
            .lock()
            .scalars
            .iter()
            .filter(|record| record.tag == tag)
            .map(|record| (record.step, record.value))
            .collect()
    }

    /// All image groups in write order
    pub fn images(&self) -> Vec<CapturedImages> {
        self.captured.lock().images.clone()
    }

    /// Distinct image tags in first-seen order
    pub fn image_tags(&self) -> Vec<String> {
        let captured = self.captured.lock();
        let mut tags: Vec<String> = Vec::new();
        for group in &captured.images {
            if !tags.contains(&group.tag) {
                tags.push(group.tag.clone());
            }
        }
        tags
    }
}

#[async_trait]
impl SummaryWriter for MemorySummaryWriter {
    fn name(&self) -> &str {
        "memory_summary_writer"
    }

    async fn scalar_summary(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        self.captured.lock().scalars.push(ScalarRecord {
            tag: tag.to_string(),
            value,
            step,
            wall_time: Utc::now(),
        });
        Ok(())
    }

    async fn image_summary(&mut self, tag: &str, images: &[RgbImage], step: u64) -> Result<()> {
        self.captured.lock().images.push(CapturedImages {
            tag: tag.to_string(),
            step,
            images: images.to_vec(),
        });
        Ok(())
    }
}
