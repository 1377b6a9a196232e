//! Runtime configuration: which device arrays go to by default.

use std::path::Path;

use devarr_kernels::Allocator;
use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::{DevarrError, Result};

/// Environment variable selecting the default device (`emulated`, `cuda:N`).
pub const DEVICE_ENV: &str = "DEVARR_DEVICE";

/// Environment variable capping the emulated device, in bytes.
pub const MEMORY_LIMIT_ENV: &str = "DEVARR_EMULATED_MEMORY_LIMIT";

/// Device selection for the per-thread default allocator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Device new arrays are allocated on.
    pub device: Device,

    /// Byte limit of the emulated device. `None` means unlimited.
    pub emulated_memory_limit: Option<usize>,
}

impl RuntimeConfig {
    /// Config for the given device with no memory limit.
    pub fn new(device: Device) -> Self {
        Self {
            device,
            emulated_memory_limit: None,
        }
    }

    /// Read `DEVARR_DEVICE` and `DEVARR_EMULATED_MEMORY_LIMIT`.
    ///
    /// Unset variables keep their defaults; malformed ones are errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(device) = lookup(DEVICE_ENV) {
            config.device = device.parse()?;
        }
        if let Some(limit) = lookup(MEMORY_LIMIT_ENV) {
            let limit = limit.trim().parse().map_err(|e| {
                DevarrError::Config(format!("{MEMORY_LIMIT_ENV}='{limit}': {e}"))
            })?;
            config.emulated_memory_limit = Some(limit);
        }
        Ok(config)
    }

    /// Parse a JSON object such as `{"device": "cuda:0"}`.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| DevarrError::Config(format!("invalid config: {e}")))
    }

    /// Load a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| DevarrError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| DevarrError::Config(e.to_string()))
    }

    /// Open an allocator on the configured device.
    pub fn open(&self) -> Result<Allocator> {
        let alloc = self.device.open(self.emulated_memory_limit)?;
        tracing::debug!("opened {} ({})", self.device, alloc.context());
        Ok(alloc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.device, Device::Emulated);
        assert_eq!(config.emulated_memory_limit, None);
    }

    #[test]
    fn test_env_values() {
        let config =
            RuntimeConfig::from_lookup(lookup(&[(DEVICE_ENV, "cuda:1"), (MEMORY_LIMIT_ENV, "4096")]))
                .unwrap();
        assert_eq!(config.device, Device::Cuda(1));
        assert_eq!(config.emulated_memory_limit, Some(4096));
    }

    #[test]
    fn test_env_errors() {
        assert!(matches!(
            RuntimeConfig::from_lookup(lookup(&[(DEVICE_ENV, "gpu")])),
            Err(DevarrError::Config(_))
        ));
        assert!(matches!(
            RuntimeConfig::from_lookup(lookup(&[(MEMORY_LIMIT_ENV, "lots")])),
            Err(DevarrError::Config(_))
        ));
    }

    #[test]
    fn test_json() {
        let config =
            RuntimeConfig::from_json(r#"{"device": "emulated", "emulated_memory_limit": 128}"#)
                .unwrap();
        assert_eq!(config.emulated_memory_limit, Some(128));

        let partial = RuntimeConfig::from_json(r#"{"device": "cuda:2"}"#).unwrap();
        assert_eq!(partial, RuntimeConfig::new(Device::Cuda(2)));

        let back = RuntimeConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);

        assert!(RuntimeConfig::from_json(r#"{"device": 3}"#).is_err());
    }

    #[test]
    fn test_open_respects_limit() {
        let config = RuntimeConfig {
            device: Device::Emulated,
            emulated_memory_limit: Some(16),
        };
        let alloc = config.open().unwrap();
        assert!(alloc.allocate(17).is_err());
    }
}
