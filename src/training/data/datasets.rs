//! Motion-transfer dataset backed by safetensors split files
//!
//! A dataset directory holds one file per split, `train.safetensors` and
//! `test.safetensors`. Each file stores two f32 tensors, `inputs` and
//! `targets`, shaped `[N, C, H, W]` with matching `N`.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use tracing::{debug, info};

use super::{Batch, DataError, Dataset, DatasetMetadata, Sample, Split};

const INPUTS_KEY: &str = "inputs";
const TARGETS_KEY: &str = "targets";

/// In-memory motion-transfer dataset
pub struct MotionDataset {
    inputs: Tensor,
    targets: Tensor,
    metadata: DatasetMetadata,
}

impl MotionDataset {
    /// Open the given split under `data_path`
    pub fn open<P: AsRef<Path>>(data_path: P, split: Split) -> Result<Self, DataError> {
        let file = data_path.as_ref().join(format!("{}.safetensors", split));
        if !file.is_file() {
            return Err(DataError::DatasetNotFound {
                path: file.display().to_string(),
            });
        }

        let mut tensors = candle_core::safetensors::load(&file, &Device::Cpu)?;
        let mut take = |name: &str| {
            tensors.remove(name).ok_or_else(|| DataError::MissingTensor {
                name: name.to_string(),
                path: file.display().to_string(),
            })
        };
        let inputs = take(INPUTS_KEY)?;
        let targets = take(TARGETS_KEY)?;

        let name = data_path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "motion".to_string());

        let dataset = Self::from_tensors(name, split, inputs, targets)?;
        info!(
            "Loaded {} split from {}: {} samples",
            split,
            file.display(),
            dataset.len()
        );
        Ok(dataset)
    }

    /// Build a dataset from `[N, C, H, W]` tensors
    pub fn from_tensors(
        name: impl Into<String>,
        split: Split,
        inputs: Tensor,
        targets: Tensor,
    ) -> Result<Self, DataError> {
        let input_shape = sample_shape(&inputs, INPUTS_KEY)?;
        let target_shape = sample_shape(&targets, TARGETS_KEY)?;

        let (num_inputs, num_targets) = (inputs.dim(0)?, targets.dim(0)?);
        if num_inputs != num_targets {
            return Err(DataError::MalformedData {
                reason: format!("{} inputs but {} targets", num_inputs, num_targets),
            });
        }

        let inputs = inputs.to_dtype(DType::F32)?.to_device(&Device::Cpu)?;
        let targets = targets.to_dtype(DType::F32)?.to_device(&Device::Cpu)?;

        let metadata = DatasetMetadata {
            name: name.into(),
            split,
            num_samples: num_inputs,
            input_shape,
            target_shape,
        };
        debug!("Dataset metadata: {:?}", metadata);

        Ok(Self { inputs, targets, metadata })
    }

    /// Write a split file in the layout [`MotionDataset::open`] reads
    pub fn save<P: AsRef<Path>>(&self, data_path: P) -> Result<(), DataError> {
        std::fs::create_dir_all(data_path.as_ref())?;
        let file = data_path.as_ref().join(format!("{}.safetensors", self.metadata.split));

        let tensors = HashMap::from([
            (INPUTS_KEY.to_string(), self.inputs.clone()),
            (TARGETS_KEY.to_string(), self.targets.clone()),
        ]);
        candle_core::safetensors::save(&tensors, &file)?;
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<(), DataError> {
        if index >= self.len() {
            return Err(DataError::InvalidIndex {
                index,
                dataset_size: self.len(),
            });
        }
        Ok(())
    }
}

fn sample_shape(tensor: &Tensor, name: &str) -> Result<[usize; 3], DataError> {
    match tensor.dims() {
        &[_, c, h, w] => Ok([c, h, w]),
        dims => Err(DataError::MalformedData {
            reason: format!("'{}' must be [N, C, H, W], got {:?}", name, dims),
        }),
    }
}

impl Dataset for MotionDataset {
    fn len(&self) -> usize {
        self.metadata.num_samples
    }

    fn get(&self, index: usize) -> Result<Sample, DataError> {
        self.check_index(index)?;
        Ok(Sample {
            input: self.inputs.get(index)?,
            target: self.targets.get(index)?,
        })
    }

    fn get_batch(&self, indices: &[usize]) -> Result<Batch, DataError> {
        if indices.is_empty() {
            return Err(DataError::BatchCollation {
                reason: "cannot collate an empty batch".to_string(),
            });
        }
        for &index in indices {
            self.check_index(index)?;
        }

        let ids: Vec<u32> = indices.iter().map(|&i| i as u32).collect();
        let ids = Tensor::from_vec(ids, indices.len(), &Device::Cpu)?;
        Batch::new(
            self.inputs.index_select(&ids, 0)?,
            self.targets.index_select(&ids, 0)?,
        )
    }

    fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ramp_dataset(n: usize, split: Split) -> MotionDataset {
        let device = Device::Cpu;
        let inputs = Tensor::arange(0f32, n as f32, &device)
            .unwrap()
            .reshape((n, 1, 1, 1))
            .unwrap()
            .repeat((1, 1, 2, 2))
            .unwrap();
        let targets = (&inputs + 100.0).unwrap();
        MotionDataset::from_tensors("ramp", split, inputs, targets).unwrap()
    }

    #[test]
    fn test_get_sample() {
        let dataset = ramp_dataset(5, Split::Train);
        assert_eq!(dataset.len(), 5);
        assert_eq!(dataset.metadata().input_shape, [1, 2, 2]);

        let sample = dataset.get(3).unwrap();
        let input: Vec<f32> = sample.input.flatten_all().unwrap().to_vec1().unwrap();
        let target: Vec<f32> = sample.target.flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(input, vec![3.0; 4]);
        assert_eq!(target, vec![103.0; 4]);
    }

    #[test]
    fn test_invalid_index() {
        let dataset = ramp_dataset(2, Split::Test);
        assert!(matches!(
            dataset.get(2),
            Err(DataError::InvalidIndex { index: 2, dataset_size: 2 })
        ));
        assert!(dataset.get_batch(&[0, 5]).is_err());
    }

    #[test]
    fn test_get_batch_preserves_order() {
        let dataset = ramp_dataset(6, Split::Train);
        let batch = dataset.get_batch(&[4, 1, 2]).unwrap();
        assert_eq!(batch.size(), 3);

        let firsts: Vec<f32> = batch
            .inputs
            .flatten_from(1)
            .unwrap()
            .narrow(1, 0, 1)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        assert_eq!(firsts, vec![4.0, 1.0, 2.0]);
    }

    #[test]
    fn test_save_and_open() {
        let dir = TempDir::new().unwrap();
        let dataset = ramp_dataset(4, Split::Test);
        dataset.save(dir.path()).unwrap();

        let reopened = MotionDataset::open(dir.path(), Split::Test).unwrap();
        assert_eq!(reopened.len(), 4);
        assert_eq!(reopened.metadata().split, Split::Test);
        assert_eq!(reopened.metadata().target_shape, [1, 2, 2]);
    }

    #[test]
    fn test_missing_split_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            MotionDataset::open(dir.path(), Split::Train),
            Err(DataError::DatasetNotFound { .. })
        ));
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let device = Device::Cpu;
        let inputs = Tensor::zeros((3, 1, 2, 2), DType::F32, &device).unwrap();
        let targets = Tensor::zeros((2, 1, 2, 2), DType::F32, &device).unwrap();
        assert!(MotionDataset::from_tensors("bad", Split::Train, inputs, targets).is_err());
    }

    #[test]
    fn test_wrong_rank_rejected() {
        let device = Device::Cpu;
        let inputs = Tensor::zeros((3, 4), DType::F32, &device).unwrap();
        let targets = Tensor::zeros((3, 4), DType::F32, &device).unwrap();
        assert!(matches!(
            MotionDataset::from_tensors("bad", Split::Train, inputs, targets),
            Err(DataError::MalformedData { .. })
        ));
    }
}
