//! Utility functions for VDNet training runs

use std::fs;
use std::path::{Path, PathBuf};

use candle_core::Device;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::training::config::{DeviceType, RuntimeConfig};

/// Device utilities
pub mod device {
    use super::*;

    /// Resolve the configured device
    ///
    /// `Auto` falls back to the CPU when CUDA is unavailable; an explicit
    /// `Cuda` or `Metal` fails instead.
    pub fn select_device(runtime: &RuntimeConfig) -> Result<Device> {
        let device = match runtime.device_type {
            DeviceType::Cpu => Device::Cpu,
            DeviceType::Cuda => Device::new_cuda(runtime.device_id).map_err(|e| {
                Error::config(format!("CUDA device {} unavailable: {}", runtime.device_id, e))
            })?,
            DeviceType::Metal => Device::new_metal(runtime.device_id).map_err(|e| {
                Error::config(format!("Metal device {} unavailable: {}", runtime.device_id, e))
            })?,
            DeviceType::Auto => Device::cuda_if_available(runtime.device_id)?,
        };
        debug!("Selected device {:?}", device);
        Ok(device)
    }

    /// Short human-readable device name
    pub fn describe(device: &Device) -> String {
        match device {
            Device::Cpu => "cpu".to_string(),
            Device::Cuda(_) => "cuda".to_string(),
            Device::Metal(_) => "metal".to_string(),
        }
    }
}

/// File I/O utilities
pub mod io {
    use super::*;

    /// Create the experiment directory, keeping whatever it already holds
    pub fn prepare_experiment_dir<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
        let path = path.as_ref();
        if path.is_dir() {
            info!("Using existing experiment directory {}", path.display());
        } else {
            fs::create_dir_all(path)?;
            info!("Created experiment directory {}", path.display());
        }
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cpu_device() {
        let runtime = RuntimeConfig {
            device_type: DeviceType::Cpu,
            ..RuntimeConfig::default()
        };
        let device = device::select_device(&runtime).unwrap();
        assert!(device.is_cpu());
        assert_eq!(device::describe(&device), "cpu");
    }

    #[test]
    fn test_prepare_experiment_dir_keeps_contents() {
        let root = TempDir::new().unwrap();
        let exp = root.path().join("exp/run");

        io::prepare_experiment_dir(&exp).unwrap();
        fs::write(exp.join("marker"), b"x").unwrap();
        io::prepare_experiment_dir(&exp).unwrap();

        assert!(exp.join("marker").is_file());
    }
}
