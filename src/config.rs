//! Architecture configuration for the VDNet model

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// VDNet architecture configuration
///
/// Image shapes are `[channels, height, width]`. They are usually filled in
/// from the dataset with [`VdnetConfig::with_shapes`] rather than written by
/// hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VdnetConfig {
    /// Shape of one input sample
    pub input_shape: [usize; 3],
    /// Shape of one target sample
    pub output_shape: [usize; 3],
    /// Width of the hidden layers in the encoder, context and decoder paths
    pub hidden_dim: usize,
    /// Dimensionality of the latent motion code
    pub latent_dim: usize,
}

impl VdnetConfig {
    /// Replace the sample shapes, keeping the layer sizes
    pub fn with_shapes(mut self, input_shape: [usize; 3], output_shape: [usize; 3]) -> Self {
        self.input_shape = input_shape;
        self.output_shape = output_shape;
        self
    }

    /// Number of scalars in one flattened input sample
    pub fn input_dim(&self) -> usize {
        self.input_shape.iter().product()
    }

    /// Number of scalars in one flattened output sample
    pub fn output_dim(&self) -> usize {
        self.output_shape.iter().product()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.input_shape.iter().any(|&d| d == 0) {
            return Err(Error::config(format!(
                "Input shape must not contain zero dimensions, got {:?}",
                self.input_shape
            )));
        }

        if self.output_shape.iter().any(|&d| d == 0) {
            return Err(Error::config(format!(
                "Output shape must not contain zero dimensions, got {:?}",
                self.output_shape
            )));
        }

        if self.hidden_dim == 0 {
            return Err(Error::config("Hidden dimension must be > 0"));
        }

        if self.latent_dim == 0 {
            return Err(Error::config("Latent dimension must be > 0"));
        }

        Ok(())
    }

    /// Approximate number of trainable parameters
    pub fn param_count(&self) -> usize {
        let (i, o, h, z) = (self.input_dim(), self.output_dim(), self.hidden_dim, self.latent_dim);
        let encoder = (i * h + h) + (h * 2 * z + 2 * z);
        let context = i * h + h;
        let decoder = ((h + z) * h + h) + (h * o + o);
        encoder + context + decoder
    }
}

impl Default for VdnetConfig {
    fn default() -> Self {
        Self {
            input_shape: [3, 32, 32],
            output_shape: [3, 32, 32],
            hidden_dim: 512,
            latent_dim: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(VdnetConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_latent_rejected() {
        let config = VdnetConfig { latent_dim: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_shapes() {
        let config = VdnetConfig::default().with_shapes([1, 8, 8], [1, 8, 8]);
        assert_eq!(config.input_dim(), 64);
        assert_eq!(config.output_dim(), 64);
        assert_eq!(config.hidden_dim, 512);
    }

    #[test]
    fn test_param_count() {
        let config = VdnetConfig {
            input_shape: [1, 2, 2],
            output_shape: [1, 2, 2],
            hidden_dim: 3,
            latent_dim: 1,
        };
        // encoder 4*3+3 + 3*2+2, context 4*3+3, decoder 4*3+3 + 3*4+4
        assert_eq!(config.param_count(), 15 + 8 + 15 + 15 + 16);
    }
}
