//! Compute device selection.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

/// Compute device for ONNX Runtime sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    /// CUDA when available, otherwise CPU.
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Auto => "auto",
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }

    /// Resolve a requested device to the one sessions will actually use.
    ///
    /// Never returns `Auto`.
    pub fn resolve(self) -> Device {
        match self {
            Device::Cpu => Device::Cpu,
            Device::Auto => {
                if cuda_available() {
                    Device::Cuda
                } else {
                    Device::Cpu
                }
            }
            Device::Cuda => {
                if cuda_available() {
                    Device::Cuda
                } else {
                    warn!("CUDA requested but not available, falling back to CPU");
                    Device::Cpu
                }
            }
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Device {
    type Err = DeviceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda),
            _ => Err(DeviceParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown inference device: {0}")]
pub struct DeviceParseError(String);

#[cfg(feature = "cuda")]
fn cuda_available() -> bool {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

    match CUDAExecutionProvider::default().is_available() {
        Ok(available) => {
            info!(available, "Probed CUDA execution provider");
            available
        }
        Err(e) => {
            warn!("Failed to query CUDA execution provider: {}", e);
            false
        }
    }
}

#[cfg(not(feature = "cuda"))]
fn cuda_available() -> bool {
    info!("Built without the cuda feature, using CPU execution provider");
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_parse() {
        assert_eq!("auto".parse::<Device>().unwrap(), Device::Auto);
        assert_eq!("CPU".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("gpu".parse::<Device>().unwrap(), Device::Cuda);
        assert!("tpu".parse::<Device>().is_err());
    }

    #[test]
    fn test_resolve_never_auto() {
        assert_ne!(Device::Auto.resolve(), Device::Auto);
        assert_eq!(Device::Cpu.resolve(), Device::Cpu);
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_falls_back_without_feature() {
        assert_eq!(Device::Cuda.resolve(), Device::Cpu);
    }
}
