//! File-backed summary writer
//!
//! Layout under the log directory:
//!
//! - `scalars.jsonl`: one [`ScalarRecord`] per line
//! - `images.jsonl`: one [`ImageRecord`] per line
//! - `images/<tag>/<step>-<index>.png`: the images themselves

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use image::RgbImage;
use serde::Serialize;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{ImageRecord, ScalarRecord, SummaryWriter};
use crate::error::{Error, Result};

/// Writes summaries as JSON lines and PNG files
pub struct FileSummaryWriter {
    name: String,
    log_dir: PathBuf,
    scalars: File,
    images: File,
    last_step: Option<u64>,
}

impl FileSummaryWriter {
    /// Open (or continue) the logs in `log_dir`
    pub async fn create<P: AsRef<Path>>(log_dir: P) -> Result<Self> {
        let log_dir = log_dir.as_ref().to_path_buf();
        fs::create_dir_all(log_dir.join("images")).await?;

        let scalars = open_append(&log_dir.join("scalars.jsonl")).await?;
        let images = open_append(&log_dir.join("images.jsonl")).await?;
        debug!("Writing summaries to {}", log_dir.display());

        Ok(Self {
            name: "file_summary_writer".to_string(),
            log_dir,
            scalars,
            images,
            last_step: None,
        })
    }

    /// Directory holding the logs
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    fn check_step(&mut self, tag: &str, step: u64) -> Result<()> {
        if let Some(last) = self.last_step {
            if step < last {
                return Err(Error::logging(format!(
                    "summary '{}' at step {} after step {}",
                    tag, step, last
                )));
            }
        }
        self.last_step = Some(step);
        Ok(())
    }
}

async fn open_append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path).await?)
}

async fn append_line<T: Serialize>(file: &mut File, record: &T) -> Result<()> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    file.write_all(&line).await?;
    Ok(())
}

/// Tags may contain characters that are awkward in file names
fn tag_dir_name(tag: &str) -> String {
    tag.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[async_trait]
impl SummaryWriter for FileSummaryWriter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scalar_summary(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        self.check_step(tag, step)?;
        let record = ScalarRecord {
            tag: tag.to_string(),
            value,
            step,
            wall_time: Utc::now(),
        };
        append_line(&mut self.scalars, &record).await
    }

    async fn image_summary(&mut self, tag: &str, images: &[RgbImage], step: u64) -> Result<()> {
        self.check_step(tag, step)?;

        let relative_dir = PathBuf::from("images").join(tag_dir_name(tag));
        let tag_dir = self.log_dir.join(&relative_dir);
        fs::create_dir_all(&tag_dir).await?;

        let files: Vec<String> = (0..images.len())
            .map(|index| {
                relative_dir
                    .join(format!("{}-{}.png", step, index))
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();

        let log_dir = self.log_dir.clone();
        let jobs: Vec<(PathBuf, RgbImage)> = files
            .iter()
            .map(|file| log_dir.join(file))
            .zip(images.iter().cloned())
            .collect();

        tokio::task::spawn_blocking(move || -> Result<()> {
            for (path, image) in jobs {
                image
                    .save(&path)
                    .map_err(|e| Error::logging(format!("failed to write {}: {}", path.display(), e)))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| Error::logging(format!("image writer task failed: {}", e)))??;

        let record = ImageRecord {
            tag: tag.to_string(),
            step,
            count: images.len(),
            files,
            wall_time: Utc::now(),
        };
        append_line(&mut self.images, &record).await
    }

    async fn flush(&mut self) -> Result<()> {
        self.scalars.flush().await?;
        self.images.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_scalars_are_appended_as_json_lines() {
        let dir = TempDir::new().unwrap();
        let mut writer = FileSummaryWriter::create(dir.path()).await.unwrap();

        writer.scalar_summary("train_loss", 0.5, 8).await.unwrap();
        writer.scalar_summary("train_loss", 0.25, 16).await.unwrap();
        writer.flush().await.unwrap();

        let lines = read_lines(&dir.path().join("scalars.jsonl"));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["tag"], "train_loss");
        assert_eq!(lines[1]["step"], 16);
        assert_eq!(lines[1]["value"], 0.25);
    }

    #[tokio::test]
    async fn test_images_are_written_as_png() {
        let dir = TempDir::new().unwrap();
        let mut writer = FileSummaryWriter::create(dir.path()).await.unwrap();

        let images = vec![RgbImage::new(4, 2), RgbImage::new(4, 2)];
        writer.image_summary("train-outputs", &images, 24).await.unwrap();
        writer.flush().await.unwrap();

        let first = dir.path().join("images/train-outputs/24-0.png");
        assert!(first.is_file());
        assert!(dir.path().join("images/train-outputs/24-1.png").is_file());
        let reopened = image::open(&first).unwrap().to_rgb8();
        assert_eq!(reopened.dimensions(), (4, 2));

        let records = read_lines(&dir.path().join("images.jsonl"));
        assert_eq!(records[0]["count"], 2);
    }

    #[tokio::test]
    async fn test_decreasing_step_rejected() {
        let dir = TempDir::new().unwrap();
        let mut writer = FileSummaryWriter::create(dir.path()).await.unwrap();

        writer.scalar_summary("test_loss_r", 1.0, 10).await.unwrap();
        writer.scalar_summary("test_loss_kl", 1.0, 10).await.unwrap();
        assert!(writer.scalar_summary("train_loss", 1.0, 9).await.is_err());
    }

    #[test]
    fn test_tag_dir_name() {
        assert_eq!(tag_dir_name("test-samples-1"), "test-samples-1");
        assert_eq!(tag_dir_name("a/b c"), "a_b_c");
    }
}
