//! Batch collation

use candle_core::{Device, Tensor};

use super::{DataError, Sample};

/// A batch of `(inputs, targets)`, batch dimension first
#[derive(Debug, Clone)]
pub struct Batch {
    /// Input frames, `[batch, channels, height, width]`
    pub inputs: Tensor,
    /// Target frames, same leading dimension as `inputs`
    pub targets: Tensor,
}

impl Batch {
    /// Create a batch, checking that both tensors agree on the batch size
    pub fn new(inputs: Tensor, targets: Tensor) -> Result<Self, DataError> {
        let (n_inputs, n_targets) = (inputs.dim(0)?, targets.dim(0)?);
        if n_inputs != n_targets {
            return Err(DataError::BatchCollation {
                reason: format!("{} inputs but {} targets", n_inputs, n_targets),
            });
        }
        Ok(Self { inputs, targets })
    }

    /// Number of samples in the batch
    pub fn size(&self) -> usize {
        self.inputs.dims().first().copied().unwrap_or(0)
    }

    /// Move both tensors to `device`
    pub fn to_device(&self, device: &Device) -> Result<Self, DataError> {
        Ok(Self {
            inputs: self.inputs.to_device(device)?,
            targets: self.targets.to_device(device)?,
        })
    }
}

/// Stack individual samples into a batch
pub fn collate(samples: Vec<Sample>) -> Result<Batch, DataError> {
    if samples.is_empty() {
        return Err(DataError::BatchCollation {
            reason: "cannot collate an empty batch".to_string(),
        });
    }

    let (inputs, targets): (Vec<Tensor>, Vec<Tensor>) = samples
        .into_iter()
        .map(|sample| (sample.input, sample.target))
        .unzip();

    let inputs = Tensor::stack(&inputs, 0).map_err(|e| DataError::BatchCollation {
        reason: format!("inputs: {}", e),
    })?;
    let targets = Tensor::stack(&targets, 0).map_err(|e| DataError::BatchCollation {
        reason: format!("targets: {}", e),
    })?;

    Batch::new(inputs, targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(value: f32) -> Sample {
        let device = Device::Cpu;
        Sample {
            input: Tensor::full(value, (1, 2, 2), &device).unwrap(),
            target: Tensor::full(value + 1.0, (1, 2, 2), &device).unwrap(),
        }
    }

    #[test]
    fn test_collate_stacks_samples() {
        let batch = collate(vec![sample(0.0), sample(1.0), sample(2.0)]).unwrap();
        assert_eq!(batch.size(), 3);
        assert_eq!(batch.inputs.dims(), &[3, 1, 2, 2]);
        assert_eq!(batch.targets.dims(), &[3, 1, 2, 2]);

        let first_target: Vec<f32> = batch.targets.get(0).unwrap().flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(first_target, vec![1.0; 4]);
    }

    #[test]
    fn test_collate_empty_fails() {
        assert!(matches!(collate(vec![]), Err(DataError::BatchCollation { .. })));
    }

    #[test]
    fn test_mismatched_batch_rejected() {
        let device = Device::Cpu;
        let inputs = Tensor::zeros((2, 1, 2, 2), candle_core::DType::F32, &device).unwrap();
        let targets = Tensor::zeros((3, 1, 2, 2), candle_core::DType::F32, &device).unwrap();
        assert!(Batch::new(inputs, targets).is_err());
    }
}
