//! The native driver surface consumed by the buffer layer.
//!
//! Everything above this trait (buffers, transfers, arrays) is written against
//! `dyn Driver`, so the same ownership and dispatch logic runs on the CUDA
//! driver API or on the host-memory emulator used by tests.

use std::fmt;

use crate::kernels::KernelCall;
use crate::launch::LaunchDims;
use crate::memset::FillPattern;
use crate::Result;

/// A raw device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DevicePtr(pub u64);

impl DevicePtr {
    /// Address used for zero-length buffers. Never passed to a driver.
    pub const NULL: DevicePtr = DevicePtr(0);

    /// Whether this is the null address.
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Address `bytes` past this one.
    pub fn byte_add(self, bytes: usize) -> DevicePtr {
        DevicePtr(self.0 + bytes as u64)
    }

    /// Raw address value.
    pub fn addr(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Identifies the device context that owns a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextId {
    /// A host-memory emulated device.
    Emulated(u32),
    /// The primary context of a CUDA device ordinal.
    Cuda(u32),
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextId::Emulated(id) => write!(f, "emulated:{id}"),
            ContextId::Cuda(idx) => write!(f, "cuda:{idx}"),
        }
    }
}

/// Native GPU driver operations.
///
/// Every call is blocking relative to the issuing thread: when it returns,
/// the bytes have moved or the kernel has finished. Implementations must be
/// safe to call from several threads at once.
pub trait Driver: Send + Sync + fmt::Debug {
    /// Short backend name ("emulated", "cuda").
    fn name(&self) -> &'static str;

    /// The context all allocations of this driver belong to.
    fn context(&self) -> ContextId;

    /// Allocate `nbytes` (> 0) of device memory.
    fn alloc(&self, nbytes: usize) -> Result<DevicePtr>;

    /// Free an allocation. `nbytes` is the size originally requested.
    fn dealloc(&self, ptr: DevicePtr, nbytes: usize) -> Result<()>;

    /// Copy `src.len()` bytes from the host to `dst`.
    fn upload(&self, dst: DevicePtr, src: &[u8]) -> Result<()>;

    /// Copy `dst.len()` bytes from `src` to the host.
    fn download(&self, dst: &mut [u8], src: DevicePtr) -> Result<()>;

    /// Copy `nbytes` between two addresses of this context.
    fn device_transfer(&self, dst: DevicePtr, src: DevicePtr, nbytes: usize) -> Result<()>;

    /// Broadcast `pattern` over `count` consecutive elements starting at `dst`.
    fn memset(&self, dst: DevicePtr, pattern: FillPattern, count: usize) -> Result<()>;

    /// Launch an elementwise kernel and wait for it to finish.
    fn launch(&self, dims: LaunchDims, call: KernelCall) -> Result<()>;

    /// Wait for all outstanding work on this context.
    fn synchronize(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ptr_arithmetic() {
        let p = DevicePtr(0x1000);
        assert_eq!(p.byte_add(16), DevicePtr(0x1010));
        assert!(!p.is_null());
        assert!(DevicePtr::NULL.is_null());
        assert_eq!(format!("{}", p), "0x1000");
    }

    #[test]
    fn test_context_display() {
        assert_eq!(format!("{}", ContextId::Cuda(1)), "cuda:1");
        assert_eq!(format!("{}", ContextId::Emulated(3)), "emulated:3");
    }
}
