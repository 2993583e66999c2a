//! Loss functions for VDNet training
//!
//! The objective is the usual conditional-VAE one:
//!
//! - **Reconstruction**: elementwise mean squared error between the generated
//!   output and the target frame ([`reconstruction_loss`])
//! - **KL divergence**: closed-form divergence of the diagonal-Gaussian
//!   posterior from the standard normal prior ([`kl_divergence`])
//!
//! and the combined loss is `reconstruction + kl_weight * kl`.
//!
//! # Usage
//! ```rust,ignore
//! use vdnet_train::training::loss::VdnetLoss;
//!
//! let (reconstruction, latent) = model.forward(&batch.inputs, ForwardMode::Reconstruct)?.into_parts()?;
//! let loss = VdnetLoss::compute(&reconstruction, &batch.targets, &latent, kl_weight)?;
//! loss.combined().backward()?;
//! let state = loss.state()?;
//! ```

pub mod reconstruction;
pub mod regularization;

pub use reconstruction::reconstruction_loss;
pub use regularization::kl_divergence;

use candle_core::{DType, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::vdnet::LatentParameters;

/// Scalar loss values for one batch or one aggregated pass
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LossState {
    /// Reconstruction (MSE) loss
    pub reconstruction: f64,
    /// KL-divergence loss
    pub kl: f64,
    /// `reconstruction + kl_weight * kl`
    pub combined: f64,
}

impl LossState {
    /// Build a state from its two components and the weight that combines them
    pub fn new(reconstruction: f64, kl: f64, kl_weight: f64) -> Self {
        Self {
            reconstruction,
            kl,
            combined: reconstruction + kl_weight * kl,
        }
    }
}

/// Loss tensors for one batch, still attached to the graph
#[derive(Debug, Clone)]
pub struct VdnetLoss {
    reconstruction: Tensor,
    kl: Tensor,
    combined: Tensor,
}

impl VdnetLoss {
    /// Evaluate both loss terms and combine them with `kl_weight`
    pub fn compute(
        output: &Tensor,
        targets: &Tensor,
        latent: &LatentParameters,
        kl_weight: f64,
    ) -> Result<Self> {
        let reconstruction = reconstruction_loss(output, targets)?;
        let kl = kl_divergence(&latent.mean, &latent.log_var)?;
        let combined = (&reconstruction + (&kl * kl_weight)?)?;

        Ok(Self {
            reconstruction,
            kl,
            combined,
        })
    }

    /// Combined loss tensor, the one to backpropagate
    pub fn combined(&self) -> &Tensor {
        &self.combined
    }

    /// Reconstruction loss tensor
    pub fn reconstruction(&self) -> &Tensor {
        &self.reconstruction
    }

    /// KL loss tensor
    pub fn kl(&self) -> &Tensor {
        &self.kl
    }

    /// Read the three scalars back to the host
    pub fn state(&self) -> Result<LossState> {
        Ok(LossState {
            reconstruction: scalar(&self.reconstruction)?,
            kl: scalar(&self.kl)?,
            combined: scalar(&self.combined)?,
        })
    }
}

/// Read a 0-dimensional tensor as `f64`
pub(crate) fn scalar(tensor: &Tensor) -> Result<f64> {
    Ok(tensor.to_dtype(DType::F64)?.to_scalar::<f64>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::Device;

    #[test]
    fn test_loss_state_combination() {
        let state = LossState::new(0.5, 20.0, 0.01);
        assert_relative_eq!(state.combined, 0.7);
    }

    #[test]
    fn test_compute_combines_terms() {
        let device = Device::Cpu;
        let output = Tensor::full(0.5f32, (2, 1, 2, 2), &device).unwrap();
        let targets = Tensor::zeros((2, 1, 2, 2), DType::F32, &device).unwrap();
        // mean = 1, log_var = 0 gives 0.5 per latent dimension
        let latent = LatentParameters {
            mean: Tensor::ones((2, 3), DType::F32, &device).unwrap(),
            log_var: Tensor::zeros((2, 3), DType::F32, &device).unwrap(),
        };

        let loss = VdnetLoss::compute(&output, &targets, &latent, 0.1).unwrap();
        let state = loss.state().unwrap();

        assert_relative_eq!(state.reconstruction, 0.25, epsilon = 1e-6);
        assert_relative_eq!(state.kl, 1.5, epsilon = 1e-6);
        assert_relative_eq!(state.combined, 0.25 + 0.1 * 1.5, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_weight_ignores_kl() {
        let device = Device::Cpu;
        let output = Tensor::full(1.0f32, (1, 1, 1, 2), &device).unwrap();
        let targets = Tensor::zeros((1, 1, 1, 2), DType::F32, &device).unwrap();
        let latent = LatentParameters {
            mean: Tensor::full(3.0f32, (1, 2), &device).unwrap(),
            log_var: Tensor::zeros((1, 2), DType::F32, &device).unwrap(),
        };

        let state = VdnetLoss::compute(&output, &targets, &latent, 0.0)
            .unwrap()
            .state()
            .unwrap();
        assert_relative_eq!(state.combined, state.reconstruction, epsilon = 1e-6);
        assert!(state.kl > 0.0);
    }
}
