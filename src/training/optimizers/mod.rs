//! Optimizers for VDNet training
//!
//! candle's built-in optimizers keep their moment estimates private, which
//! makes them impossible to checkpoint. The optimizers here expose their full
//! state as an [`OptimizerState`] (hyper-parameters and step count, stored as
//! JSON) plus a map of named moment tensors (stored as safetensors).

pub mod adam;
pub mod state;

pub use adam::{Adam, AdamConfig};
pub use state::{OptimizerState, OptimizerStateDict};

use candle_core::backprop::GradStore;
use candle_core::Tensor;

/// Trait for optimizers
pub trait Optimizer: Send {
    /// Optimizer name
    fn name(&self) -> &str;

    /// Apply one update from already computed gradients
    fn step(&mut self, gradients: &GradStore) -> candle_core::Result<()>;

    /// Backpropagate `loss` and apply one update
    fn backward_step(&mut self, loss: &Tensor) -> candle_core::Result<()> {
        let gradients = loss.backward()?;
        self.step(&gradients)
    }

    /// Get current learning rate
    fn learning_rate(&self) -> f64;

    /// Set learning rate
    fn set_learning_rate(&mut self, lr: f64);

    /// Number of updates applied so far
    fn step_count(&self) -> usize;

    /// Number of parameter tensors being optimized
    fn parameter_count(&self) -> usize;

    /// Snapshot the full optimizer state
    fn state_dict(&self) -> OptimizerStateDict;

    /// Restore a snapshot taken with [`Optimizer::state_dict`]
    fn load_state_dict(&mut self, state: OptimizerStateDict) -> candle_core::Result<()>;
}
