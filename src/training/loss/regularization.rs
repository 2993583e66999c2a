//! KL-divergence regularization of the latent posterior

use candle_core::Tensor;

use crate::error::{Error, Result};

/// KL divergence of `N(mean, exp(log_var))` from `N(0, I)`
///
/// `0.5 * sum(exp(log_var) + mean^2 - 1 - log_var)` summed over the latent
/// dimension and averaged over the batch. Inputs are `[batch, latent_dim]`.
pub fn kl_divergence(mean: &Tensor, log_var: &Tensor) -> Result<Tensor> {
    if mean.shape() != log_var.shape() || mean.rank() != 2 {
        return Err(Error::config(format!(
            "mean {:?} and log_var {:?} must share a [batch, latent] shape",
            mean.dims(),
            log_var.dims()
        )));
    }

    let per_dim = ((log_var.exp()? + mean.sqr()?)? - 1.0)?;
    let per_dim = (per_dim - log_var)?;
    let per_sample = per_dim.sum(1)?;

    Ok((per_sample.mean_all()? * 0.5)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::loss::scalar;
    use approx::assert_relative_eq;
    use candle_core::{DType, Device};

    #[test]
    fn test_standard_normal_has_zero_divergence() {
        let device = Device::Cpu;
        let mean = Tensor::zeros((4, 8), DType::F32, &device).unwrap();
        let log_var = Tensor::zeros((4, 8), DType::F32, &device).unwrap();
        let kl = kl_divergence(&mean, &log_var).unwrap();
        assert_relative_eq!(scalar(&kl).unwrap(), 0.0);
    }

    #[test]
    fn test_closed_form_value() {
        let device = Device::Cpu;
        // sample 0: mean 2, log_var 0 -> 0.5 * 4 = 2 per dim
        // sample 1: mean 0, log_var ln 2 -> 0.5 * (2 - 1 - ln 2) per dim
        let ln2 = std::f32::consts::LN_2;
        let mean = Tensor::new(&[[2f32, 2.0], [0.0, 0.0]], &device).unwrap();
        let log_var = Tensor::new(&[[0f32, 0.0], [ln2, ln2]], &device).unwrap();

        let kl = scalar(&kl_divergence(&mean, &log_var).unwrap()).unwrap();
        let sample0 = 2.0 * 2.0;
        let sample1 = 2.0 * 0.5 * (1.0 - std::f64::consts::LN_2);
        assert_relative_eq!(kl, (sample0 + sample1) / 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_divergence_is_non_negative() {
        let device = Device::Cpu;
        let mean = Tensor::randn(0f32, 1f32, (16, 4), &device).unwrap();
        let log_var = Tensor::randn(0f32, 1f32, (16, 4), &device).unwrap();
        let kl = scalar(&kl_divergence(&mean, &log_var).unwrap()).unwrap();
        assert!(kl >= 0.0);
    }

    #[test]
    fn test_rejects_mismatched_shapes() {
        let device = Device::Cpu;
        let mean = Tensor::zeros((2, 3), DType::F32, &device).unwrap();
        let log_var = Tensor::zeros((2, 4), DType::F32, &device).unwrap();
        assert!(kl_divergence(&mean, &log_var).is_err());
    }
}
