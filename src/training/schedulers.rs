//! Adaptive KL-weight scheduling
//!
//! The KL term starts with a small weight so the network first learns to
//! reconstruct. Once the average test reconstruction loss drops below a target
//! and the weighted KL term is smaller than the reconstruction term, the weight
//! doubles, up to a ceiling. The weight never decreases.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Current weight of the KL term in the combined loss
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KlWeight(f64);

impl KlWeight {
    /// Create a weight, rejecting negative or non-finite values
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::config(format!(
                "KL weight must be finite and non-negative, got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    /// Raw weight value
    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for KlWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of one scheduling decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KlWeightUpdate {
    /// Weight before the decision
    pub previous: KlWeight,
    /// Weight to use from now on
    pub current: KlWeight,
    /// Whether the weight changed
    pub adjusted: bool,
}

/// Doubling scheduler for the KL weight
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KlWeightScheduler {
    /// Reconstruction loss the test set must drop below; `None` disables adjustment
    pub target_loss: Option<f64>,
    /// Ceiling the weight is clamped to
    pub max_weight: f64,
}

impl Default for KlWeightScheduler {
    fn default() -> Self {
        Self {
            target_loss: Some(10.0),
            max_weight: f64::INFINITY,
        }
    }
}

impl KlWeightScheduler {
    /// Create a scheduler
    pub fn new(target_loss: Option<f64>, max_weight: f64) -> Result<Self> {
        let scheduler = Self {
            target_loss,
            max_weight,
        };
        scheduler.validate()?;
        Ok(scheduler)
    }

    /// Check the ceiling and target are usable
    pub fn validate(&self) -> Result<()> {
        if self.max_weight.is_nan() || self.max_weight < 0.0 {
            return Err(Error::config(format!(
                "max KL weight must be non-negative, got {}",
                self.max_weight
            )));
        }
        if let Some(target) = self.target_loss {
            if !target.is_finite() {
                return Err(Error::config(format!("target loss must be finite, got {}", target)));
            }
        }
        Ok(())
    }

    /// Check that `weight` lies under the ceiling
    pub fn check_initial(&self, weight: KlWeight) -> Result<()> {
        if weight.value() > self.max_weight {
            return Err(Error::config(format!(
                "initial KL weight {} exceeds max weight {}",
                weight, self.max_weight
            )));
        }
        Ok(())
    }

    /// Decide the weight for the next epoch from the averaged test losses
    pub fn adjust(&self, test_loss_r: f64, test_loss_kl: f64, weight: KlWeight) -> KlWeightUpdate {
        let w = weight.value();
        let unchanged = KlWeightUpdate {
            previous: weight,
            current: weight,
            adjusted: false,
        };

        let Some(target) = self.target_loss else {
            return unchanged;
        };

        if test_loss_r < target && test_loss_kl * w < test_loss_r && w < self.max_weight {
            let next = KlWeight((w * 2.0).min(self.max_weight));
            KlWeightUpdate {
                previous: weight,
                current: next,
                adjusted: next != weight,
            }
        } else {
            unchanged
        }
    }
}
