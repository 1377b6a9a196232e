//! CUDA kernel launcher with NVRTC compilation and caching.
//!
//! Compiles the embedded `.cu` source at runtime, loads it once per device
//! and hands out function handles by name.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use cudarc::driver::{CudaDevice, CudaFunction, LaunchConfig};
use parking_lot::Mutex;

use crate::launch::LaunchDims;
use crate::{DeviceError, Result};

/// Name of the module holding every elementwise kernel.
pub const ELEMENTWISE_MODULE: &str = "devarr_elementwise";

const ELEMENTWISE_CU: &str = include_str!("kernels/elementwise.cu");

/// Function names exported by the elementwise module.
const ELEMENTWISE_FUNCS: &[&str] = &[
    "tri_mask_u8", "tri_mask_u16", "tri_mask_u32", "tri_mask_u64",
    "fill_u8", "fill_u16", "fill_u32", "fill_u64",
];

/// Registry of compiled modules. Key: (device_idx, module_name)
static LOADED: OnceLock<Mutex<HashSet<(usize, &'static str)>>> = OnceLock::new();

fn loaded_set() -> &'static Mutex<HashSet<(usize, &'static str)>> {
    LOADED.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Ensure the elementwise module is compiled and loaded on the given device.
/// No-op if already loaded.
pub fn ensure_elementwise(device: &Arc<CudaDevice>, device_idx: usize) -> Result<()> {
    let key = (device_idx, ELEMENTWISE_MODULE);
    let mut set = loaded_set().lock();
    if set.contains(&key) {
        return Ok(());
    }

    let ptx = cudarc::nvrtc::compile_ptx(ELEMENTWISE_CU).map_err(|e| {
        DeviceError::Launch(format!("PTX compile '{ELEMENTWISE_MODULE}': {e}"))
    })?;
    device
        .load_ptx(ptx, ELEMENTWISE_MODULE, ELEMENTWISE_FUNCS)
        .map_err(|e| DeviceError::Launch(format!("load module '{ELEMENTWISE_MODULE}': {e}")))?;

    tracing::debug!("loaded module '{}' on cuda:{}", ELEMENTWISE_MODULE, device_idx);
    set.insert(key);
    Ok(())
}

/// Get a kernel function handle, loading the module if needed.
pub fn get_or_load_func(
    device: &Arc<CudaDevice>,
    device_idx: usize,
    func_name: &str,
) -> Result<CudaFunction> {
    ensure_elementwise(device, device_idx)?;
    device
        .get_func(ELEMENTWISE_MODULE, func_name)
        .ok_or_else(|| {
            DeviceError::Launch(format!(
                "function '{func_name}' not found in '{ELEMENTWISE_MODULE}'"
            ))
        })
}

/// Convert launch geometry into cudarc's launch configuration.
pub fn launch_config(dims: LaunchDims) -> LaunchConfig {
    LaunchConfig {
        grid_dim: (dims.grid, 1, 1),
        block_dim: (dims.block, 1, 1),
        shared_mem_bytes: 0,
    }
}
