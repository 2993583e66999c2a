//! Sample-weighted aggregation of per-batch losses

use serde::{Deserialize, Serialize};

use crate::training::loss::LossState;

/// Running mean where every value carries a weight
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightedMean {
    sum: f64,
    weight: f64,
}

impl WeightedMean {
    /// Empty mean
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` with `weight`
    pub fn add(&mut self, value: f64, weight: f64) {
        self.sum += value * weight;
        self.weight += weight;
    }

    /// Weighted mean, 0 when nothing was added
    pub fn mean(&self) -> f64 {
        if self.weight > 0.0 {
            self.sum / self.weight
        } else {
            0.0
        }
    }

    /// Total weight added
    pub fn total_weight(&self) -> f64 {
        self.weight
    }
}

/// Averages batch losses over an epoch, weighting each batch by its size
#[derive(Debug, Clone, Default)]
pub struct LossAccumulator {
    reconstruction: WeightedMean,
    kl: WeightedMean,
    combined: WeightedMean,
    samples: usize,
    batches: usize,
}

impl LossAccumulator {
    /// Empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the losses of one batch of `batch_size` samples
    pub fn add(&mut self, loss: &LossState, batch_size: usize) {
        let weight = batch_size as f64;
        self.reconstruction.add(loss.reconstruction, weight);
        self.kl.add(loss.kl, weight);
        self.combined.add(loss.combined, weight);
        self.samples += batch_size;
        self.batches += 1;
    }

    /// Sample-weighted mean of each loss term
    pub fn mean(&self) -> LossState {
        LossState {
            reconstruction: self.reconstruction.mean(),
            kl: self.kl.mean(),
            combined: self.combined.mean(),
        }
    }

    /// Number of samples seen
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Number of batches seen
    pub fn batches(&self) -> usize {
        self.batches
    }
}
