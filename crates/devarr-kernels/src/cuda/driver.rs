//! [`Driver`] implementation over the CUDA driver API.
//!
//! Memory operations use raw `cuMem*` calls on the device's primary context;
//! kernels go through cudarc's launcher and are followed by a device
//! synchronize so every call stays blocking.

use std::fmt;
use std::sync::Arc;

use cudarc::driver::{result, sys, CudaDevice, LaunchAsync};

use super::context::get_device;
use super::launch::{get_or_load_func, launch_config};
use crate::driver::{ContextId, DevicePtr, Driver};
use crate::kernels::{KernelCall, TriangleMode};
use crate::launch::LaunchDims;
use crate::memset::FillPattern;
use crate::{DeviceError, Result};

/// Driver bound to one CUDA device's primary context.
pub struct CudaDriver {
    device: Arc<CudaDevice>,
    device_idx: usize,
}

impl CudaDriver {
    /// Open (or reuse) the device with the given ordinal.
    pub fn new(device_idx: usize) -> Result<Self> {
        let device = get_device(device_idx)?;
        Ok(Self { device, device_idx })
    }

    /// The cudarc device handle.
    pub fn device(&self) -> &Arc<CudaDevice> {
        &self.device
    }

    fn bind(&self, what: &str) -> Result<()> {
        self.device
            .bind_to_thread()
            .map_err(|e| DeviceError::driver(what, e))
    }
}

impl fmt::Debug for CudaDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CudaDriver")
            .field("device_idx", &self.device_idx)
            .finish()
    }
}

impl Driver for CudaDriver {
    fn name(&self) -> &'static str {
        "cuda"
    }

    fn context(&self) -> ContextId {
        ContextId::Cuda(self.device_idx as u32)
    }

    fn alloc(&self, nbytes: usize) -> Result<DevicePtr> {
        self.bind("alloc")?;
        let ptr = unsafe { result::malloc_sync(nbytes) }.map_err(|e| DeviceError::Allocation {
            nbytes,
            msg: e.to_string(),
        })?;
        Ok(DevicePtr(ptr))
    }

    fn dealloc(&self, ptr: DevicePtr, _nbytes: usize) -> Result<()> {
        self.bind("dealloc")?;
        unsafe { result::free_sync(ptr.addr()) }.map_err(|e| DeviceError::driver("cuMemFree", e))
    }

    fn upload(&self, dst: DevicePtr, src: &[u8]) -> Result<()> {
        self.bind("upload")?;
        unsafe { result::memcpy_htod_sync(dst.addr(), src) }
            .map_err(|e| DeviceError::driver("cuMemcpyHtoD", e))
    }

    fn download(&self, dst: &mut [u8], src: DevicePtr) -> Result<()> {
        self.bind("download")?;
        unsafe { result::memcpy_dtoh_sync(dst, src.addr()) }
            .map_err(|e| DeviceError::driver("cuMemcpyDtoH", e))
    }

    fn device_transfer(&self, dst: DevicePtr, src: DevicePtr, nbytes: usize) -> Result<()> {
        self.bind("device_transfer")?;
        unsafe { result::memcpy_dtod_sync(dst.addr(), src.addr(), nbytes) }
            .map_err(|e| DeviceError::driver("cuMemcpyDtoD", e))
    }

    fn memset(&self, dst: DevicePtr, pattern: FillPattern, count: usize) -> Result<()> {
        self.bind("memset")?;
        let res = match pattern {
            FillPattern::U8(v) => unsafe { result::memset_d8_sync(dst.addr(), v, count) },
            FillPattern::U16(v) => unsafe { sys::lib().cuMemsetD16_v2(dst.addr(), v, count) }.result(),
            FillPattern::U32(v) => unsafe { sys::lib().cuMemsetD32_v2(dst.addr(), v, count) }.result(),
        };
        res.map_err(|e| DeviceError::driver("cuMemset", e))
    }

    fn launch(&self, dims: LaunchDims, call: KernelCall) -> Result<()> {
        let func = get_or_load_func(&self.device, self.device_idx, call.func_name()?)?;
        let cfg = launch_config(dims);
        let launched = match call {
            KernelCall::TriangularMask(p) => {
                let lower = (p.mode == TriangleMode::LowerExcludingAbove) as u32;
                unsafe { func.launch(cfg, (p.data.addr(), p.rows, p.cols, p.diagonal, lower)) }
            }
            KernelCall::Fill(p) => unsafe { func.launch(cfg, (p.data.addr(), p.count, p.value)) },
        };
        launched.map_err(|e| DeviceError::Launch(e.to_string()))?;
        self.synchronize()
    }

    fn synchronize(&self) -> Result<()> {
        self.device
            .synchronize()
            .map_err(|e| DeviceError::driver("synchronize", e))
    }
}
