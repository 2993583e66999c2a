//! Deterministic synthetic motion data

use std::sync::Arc;

use candle_core::{DType, Tensor};

use super::test_utils::{create_test_device, FRAME_SHAPE};
use crate::training::data::{Batch, MotionDataset, Split};

fn frames(num_samples: usize, phase: f64) -> Tensor {
    let [c, h, w] = FRAME_SHAPE;
    let total = num_samples * c * h * w;
    Tensor::arange(0f32, total as f32, &create_test_device())
        .unwrap()
        .affine(0.37, phase)
        .unwrap()
        .sin()
        .unwrap()
        .abs()
        .unwrap()
        .reshape((num_samples, c, h, w))
        .unwrap()
}

/// Dataset whose targets are the inverted inputs, values in `[0, 1]`
pub fn create_mock_dataset(num_samples: usize, split: Split) -> Arc<MotionDataset> {
    let phase = match split {
        Split::Train => 0.0,
        Split::Test => 0.5,
    };
    let inputs = frames(num_samples, phase);
    let targets = inputs.affine(-1.0, 1.0).unwrap();
    Arc::new(MotionDataset::from_tensors("mock", split, inputs, targets).unwrap())
}

/// Dataset with no samples
pub fn create_empty_dataset(split: Split) -> Arc<MotionDataset> {
    let [c, h, w] = FRAME_SHAPE;
    let device = create_test_device();
    let inputs = Tensor::zeros((0, c, h, w), DType::F32, &device).unwrap();
    let targets = inputs.clone();
    Arc::new(MotionDataset::from_tensors("empty", split, inputs, targets).unwrap())
}

/// A single batch of `size` samples
pub fn create_mock_batch(size: usize) -> Batch {
    let inputs = frames(size, 0.25);
    let targets = inputs.affine(-1.0, 1.0).unwrap();
    Batch::new(inputs, targets).unwrap()
}
