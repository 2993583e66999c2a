//! Data loaders for VDNet training with async prefetching

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{self, Stream, StreamExt};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, instrument};

use super::{Batch, DataError, Dataset};

/// Configuration for DataLoader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataLoaderConfig {
    /// Batch size
    pub batch_size: usize,
    /// Whether to shuffle data every epoch
    pub shuffle: bool,
    /// Number of concurrent loading workers (0 loads inline)
    pub num_workers: usize,
    /// Number of batches prefetched per worker
    pub prefetch_factor: usize,
    /// Whether to drop the last incomplete batch
    pub drop_last: bool,
    /// Seed for the shuffling RNG, random when unset
    pub seed: Option<u64>,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            shuffle: true,
            num_workers: 8,
            prefetch_factor: 2,
            drop_last: false,
            seed: None,
        }
    }
}

/// Async data loader that prefetches batches in order
pub struct DataLoader<D: Dataset + 'static> {
    /// Dataset reference
    dataset: Arc<D>,
    /// DataLoader configuration
    config: DataLoaderConfig,
    /// Shuffling RNG
    rng: Mutex<StdRng>,
}

impl<D: Dataset + 'static> DataLoader<D> {
    /// Create a new DataLoader
    pub fn new(dataset: Arc<D>, config: DataLoaderConfig) -> Self {
        debug!(
            "Creating DataLoader for {} ({} samples) with batch_size={}, num_workers={}, shuffle={}",
            dataset.metadata().split,
            dataset.len(),
            config.batch_size,
            config.num_workers,
            config.shuffle
        );

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            dataset,
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Get the number of batches per epoch
    pub fn num_batches(&self) -> usize {
        let dataset_size = self.dataset.len();
        if self.config.drop_last {
            dataset_size / self.config.batch_size
        } else {
            dataset_size.div_ceil(self.config.batch_size)
        }
    }

    /// Get dataset size
    pub fn dataset_size(&self) -> usize {
        self.dataset.len()
    }

    /// Number of samples one epoch actually yields
    pub fn samples_per_epoch(&self) -> usize {
        if self.config.drop_last {
            self.num_batches() * self.config.batch_size
        } else {
            self.dataset.len()
        }
    }

    /// Underlying dataset
    pub fn dataset(&self) -> &Arc<D> {
        &self.dataset
    }

    /// Loader configuration
    pub fn config(&self) -> &DataLoaderConfig {
        &self.config
    }

    /// Index lists for one epoch, shuffled if configured
    fn epoch_batches(&self) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.config.shuffle {
            indices.shuffle(&mut *self.rng.lock());
        }

        indices
            .chunks(self.config.batch_size)
            .filter(|chunk| !self.config.drop_last || chunk.len() == self.config.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    /// Create a stream of batches for one epoch
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip(self), fields(split = %self.dataset.metadata().split))]
    pub fn epoch_stream(&self) -> DataLoaderStream {
        let batches = self.epoch_batches();
        DataLoaderStream::spawn(
            self.dataset.clone(),
            batches,
            self.config.num_workers,
            self.config.prefetch_factor,
        )
    }

    /// Draw the first batch of a fresh epoch ordering
    pub async fn sample_batch(&self) -> Result<Option<Batch>, DataError> {
        let first = match self.epoch_batches().into_iter().next() {
            Some(indices) => indices,
            None => return Ok(None),
        };
        load_batch(self.dataset.clone(), first, self.config.num_workers)
            .await
            .map(Some)
    }
}

async fn load_batch<D: Dataset + 'static>(
    dataset: Arc<D>,
    indices: Vec<usize>,
    num_workers: usize,
) -> Result<Batch, DataError> {
    if num_workers == 0 {
        return dataset.get_batch(&indices);
    }

    tokio::task::spawn_blocking(move || dataset.get_batch(&indices))
        .await
        .map_err(|e| DataError::WorkerFailed { reason: e.to_string() })?
}

/// Stream of prefetched batches for one epoch
pub struct DataLoaderStream {
    /// Channel receiver for batches
    receiver: mpsc::Receiver<Result<Batch, DataError>>,
    /// Number of batches processed
    batches_processed: usize,
    /// Total number of batches
    total_batches: usize,
}

impl DataLoaderStream {
    fn spawn<D: Dataset + 'static>(
        dataset: Arc<D>,
        batches: Vec<Vec<usize>>,
        num_workers: usize,
        prefetch_factor: usize,
    ) -> Self {
        let total_batches = batches.len();
        let concurrency = num_workers.max(1);
        let (sender, receiver) = mpsc::channel(concurrency * prefetch_factor.max(1));

        debug!(
            "Prefetching {} batches with {} workers",
            total_batches, num_workers
        );

        tokio::spawn(async move {
            // `buffered` keeps up to `concurrency` loads in flight and yields
            // them in submission order.
            let mut loads = stream::iter(batches)
                .map(|indices| load_batch(dataset.clone(), indices, num_workers))
                .buffered(concurrency);

            while let Some(result) = loads.next().await {
                let failed = result.is_err();
                if let Err(e) = &result {
                    error!("Batch loading failed: {}", e);
                }
                if sender.send(result).await.is_err() || failed {
                    break;
                }
            }
        });

        Self {
            receiver,
            batches_processed: 0,
            total_batches,
        }
    }

    /// Get the number of batches processed
    pub fn batches_processed(&self) -> usize {
        self.batches_processed
    }

    /// Get the total number of batches
    pub fn total_batches(&self) -> usize {
        self.total_batches
    }
}

impl Stream for DataLoaderStream {
    type Item = Result<Batch, DataError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(batch)) => {
                self.batches_processed += 1;
                Poll::Ready(Some(batch))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
