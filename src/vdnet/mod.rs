//! VDNet: a conditional variational network for motion transfer
//!
//! The trainer only talks to the model through [`GenerativeModel`]. A forward
//! pass runs in one of two modes: [`ForwardMode::Reconstruct`] infers a latent
//! posterior from the inputs and decodes a sample of it, while
//! [`ForwardMode::SamplePrior`] decodes a draw from the standard normal prior.

mod network;

pub use network::VDNet;

use candle_core::Tensor;
use candle_nn::VarMap;

use crate::error::Result;

/// Forward-pass mode selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    /// Encode the inputs, sample the posterior and decode
    Reconstruct,
    /// Decode a latent drawn from the standard normal prior
    SamplePrior,
}

/// Parameters of the diagonal-Gaussian approximate posterior
#[derive(Debug, Clone)]
pub struct LatentParameters {
    /// Posterior mean, `[batch, latent_dim]`
    pub mean: Tensor,
    /// Posterior log-variance, `[batch, latent_dim]`
    pub log_var: Tensor,
}

/// Output of a forward pass
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// Generated output, same shape as the targets
    pub reconstruction: Tensor,
    /// Posterior parameters, present only in [`ForwardMode::Reconstruct`]
    pub latent: Option<LatentParameters>,
}

impl ModelOutput {
    /// Split into reconstruction and posterior parameters
    ///
    /// Fails when the output came from prior sampling.
    pub fn into_parts(self) -> Result<(Tensor, LatentParameters)> {
        match self.latent {
            Some(latent) => Ok((self.reconstruction, latent)),
            None => Err(candle_core::Error::Msg(
                "model output carries no latent parameters (prior sample)".to_string(),
            )
            .into()),
        }
    }
}

/// A stochastic generative model trainable by the VDNet driver
pub trait GenerativeModel: Send {
    /// Model name used in logs
    fn name(&self) -> &str;

    /// Run a forward pass over a batch of inputs
    fn forward(&self, inputs: &Tensor, mode: ForwardMode) -> Result<ModelOutput>;

    /// Trainable parameters
    fn var_map(&self) -> &VarMap;

    /// Mutable access to the parameters, used when restoring a checkpoint
    fn var_map_mut(&mut self) -> &mut VarMap;

    /// Total number of trainable scalars
    fn num_parameters(&self) -> usize {
        self.var_map()
            .all_vars()
            .iter()
            .map(|var| var.as_tensor().elem_count())
            .sum()
    }
}
