//! Optimizer state for checkpointing

use std::collections::HashMap;
use std::path::Path;

use candle_core::{Device, Tensor};
use serde::{Deserialize, Serialize};

use super::AdamConfig;

/// Serializable optimizer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    /// Optimizer type
    pub optimizer_type: String,

    /// Number of updates applied
    pub step_count: usize,

    /// Hyper-parameters in effect
    pub config: AdamConfig,
}

/// Full optimizer state: metadata plus named moment tensors
#[derive(Debug, Clone)]
pub struct OptimizerStateDict {
    /// Metadata, stored alongside the checkpoint manifest
    pub state: OptimizerState,

    /// Moment tensors keyed `m.<var>` and `v.<var>`
    pub tensors: HashMap<String, Tensor>,
}

impl OptimizerStateDict {
    /// Write the moment tensors as a safetensors file
    pub fn save_tensors<P: AsRef<Path>>(&self, path: P) -> candle_core::Result<()> {
        candle_core::safetensors::save(&self.tensors, path)
    }

    /// Pair metadata with moment tensors read from a safetensors file
    pub fn load<P: AsRef<Path>>(
        state: OptimizerState,
        path: P,
        device: &Device,
    ) -> candle_core::Result<Self> {
        let tensors = candle_core::safetensors::load(path, device)?;
        Ok(Self { state, tensors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use tempfile::TempDir;

    #[test]
    fn test_optimizer_state_serialization() {
        let state = OptimizerState {
            optimizer_type: "adam".to_string(),
            step_count: 12,
            config: AdamConfig::default(),
        };

        let json = serde_json::to_string(&state).unwrap();
        let restored: OptimizerState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_tensor_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("optimizer.safetensors");
        let device = Device::Cpu;

        let dict = OptimizerStateDict {
            state: OptimizerState {
                optimizer_type: "adam".to_string(),
                step_count: 1,
                config: AdamConfig::default(),
            },
            tensors: HashMap::from([
                ("m.w".to_string(), Tensor::ones((2, 2), DType::F32, &device).unwrap()),
                ("v.w".to_string(), Tensor::zeros((2, 2), DType::F32, &device).unwrap()),
            ]),
        };
        dict.save_tensors(&path).unwrap();

        let loaded = OptimizerStateDict::load(dict.state.clone(), &path, &device).unwrap();
        assert_eq!(loaded.tensors.len(), 2);
        assert_eq!(loaded.tensors["m.w"].dims(), &[2, 2]);
    }
}
