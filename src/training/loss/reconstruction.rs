//! Reconstruction loss between generated and target frames

use candle_core::Tensor;
use tracing::trace;

use crate::error::{Error, Result};

/// Elementwise mean squared error over every pixel of every sample
pub fn reconstruction_loss(output: &Tensor, targets: &Tensor) -> Result<Tensor> {
    if output.shape() != targets.shape() {
        return Err(Error::config(format!(
            "output shape {:?} does not match target shape {:?}",
            output.dims(),
            targets.dims()
        )));
    }

    let loss = candle_nn::loss::mse(output, targets)?;
    trace!("reconstruction loss over {} elements", output.elem_count());
    Ok(loss)
}
