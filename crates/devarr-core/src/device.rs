use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use devarr_kernels::{Allocator, EmulatedDriver};
use serde::{Deserialize, Serialize};

use crate::{DevarrError, Result};

/// Device that arrays are allocated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    /// Host memory behind the emulated driver
    #[default]
    Emulated,
    /// CUDA GPU with device index
    Cuda(usize),
}

impl Device {
    /// Devices this build can open: the emulated device, then every CUDA
    /// ordinal that initializes.
    pub fn available() -> Vec<Device> {
        std::iter::once(Device::Emulated)
            .chain((0..cuda_device_count()).map(Device::Cuda))
            .collect()
    }

    /// Open an allocator on this device.
    ///
    /// `memory_limit` caps the emulated device and is ignored for CUDA.
    pub fn open(&self, memory_limit: Option<usize>) -> Result<Allocator> {
        match *self {
            Device::Emulated => {
                let driver = match memory_limit {
                    Some(limit) => EmulatedDriver::with_memory_limit(limit),
                    None => EmulatedDriver::new(),
                };
                Ok(Allocator::new(Arc::new(driver)))
            }
            #[cfg(feature = "cuda")]
            Device::Cuda(idx) => Ok(Allocator::cuda(idx)?),
            #[cfg(not(feature = "cuda"))]
            Device::Cuda(idx) => Err(devarr_kernels::DeviceError::DeviceUnavailable(format!(
                "cuda:{idx} requested but devarr was built without the `cuda` feature"
            ))
            .into()),
        }
    }
}

#[cfg(feature = "cuda")]
fn cuda_device_count() -> usize {
    devarr_kernels::cuda::device_count()
}

#[cfg(not(feature = "cuda"))]
fn cuda_device_count() -> usize {
    0
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Emulated => write!(f, "emulated"),
            Device::Cuda(idx) => write!(f, "cuda:{idx}"),
        }
    }
}

impl FromStr for Device {
    type Err = DevarrError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s {
            "emulated" => return Ok(Device::Emulated),
            "cuda" => return Ok(Device::Cuda(0)),
            _ => {}
        }
        s.strip_prefix("cuda:")
            .and_then(|idx| idx.parse().ok())
            .map(Device::Cuda)
            .ok_or_else(|| DevarrError::Config(format!("unknown device '{s}'")))
    }
}

impl TryFrom<String> for Device {
    type Error = DevarrError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> String {
        device.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devarr_kernels::DeviceError;

    #[test]
    fn test_display_and_parse() {
        assert_eq!(format!("{}", Device::Emulated), "emulated");
        assert_eq!(format!("{}", Device::Cuda(2)), "cuda:2");
        assert_eq!("cuda:3".parse::<Device>().unwrap(), Device::Cuda(3));
        assert_eq!("cuda".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!(" emulated ".parse::<Device>().unwrap(), Device::Emulated);
        assert!(matches!("tpu:0".parse::<Device>(), Err(DevarrError::Config(_))));
        assert!("cuda:x".parse::<Device>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Device::Cuda(1)).unwrap();
        assert_eq!(json, "\"cuda:1\"");
        let back: Device = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Device::Cuda(1));
    }

    #[test]
    fn test_available_lists_emulated_first() {
        let devices = Device::available();
        assert_eq!(devices[0], Device::Emulated);
        assert!(devices[1..].iter().all(|d| matches!(d, Device::Cuda(_))));
    }

    #[test]
    fn test_open_emulated() {
        let alloc = Device::Emulated.open(Some(64)).unwrap();
        let _full = alloc.allocate(64).unwrap();
        assert!(matches!(alloc.allocate(1), Err(DeviceError::Allocation { nbytes: 1, .. })));
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_open_cuda_without_feature() {
        let err = Device::Cuda(0).open(None).unwrap_err();
        assert!(matches!(err, DevarrError::Device(DeviceError::DeviceUnavailable(_))));
    }
}
