//! Per-ordinal CUDA device handles.
//!
//! Each ordinal is opened once (retaining its primary context) and shared by
//! every [`CudaDriver`](super::CudaDriver) on that ordinal.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use cudarc::driver::CudaDevice;
use parking_lot::Mutex;

use crate::{DeviceError, Result};

/// Opened devices keyed by ordinal.
static DEVICES: OnceLock<Mutex<HashMap<usize, Arc<CudaDevice>>>> = OnceLock::new();

fn devices() -> &'static Mutex<HashMap<usize, Arc<CudaDevice>>> {
    DEVICES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Open device `device_idx`, or return the handle opened earlier.
pub fn get_device(device_idx: usize) -> Result<Arc<CudaDevice>> {
    let mut map = devices().lock();
    if let Some(dev) = map.get(&device_idx) {
        return Ok(Arc::clone(dev));
    }
    let dev = CudaDevice::new(device_idx)
        .map_err(|e| DeviceError::DeviceUnavailable(format!("cuda:{device_idx}: {e}")))?;
    match dev.name() {
        Ok(name) => tracing::info!("initialized cuda:{} ({})", device_idx, name),
        Err(_) => tracing::info!("initialized cuda:{}", device_idx),
    }
    map.insert(device_idx, Arc::clone(&dev));
    Ok(dev)
}

/// Whether ordinal 0 can be opened.
pub fn is_cuda_available() -> bool {
    get_device(0).is_ok()
}

/// Number of consecutive ordinals, from 0, that open successfully.
pub fn device_count() -> usize {
    (0..16).take_while(|&i| get_device(i).is_ok()).count()
}
