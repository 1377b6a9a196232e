//! A device emulated in host memory.
//!
//! Implements the full [`Driver`] surface over a map of host byte vectors
//! keyed by fake device addresses. Kernel launches run every thread of the
//! grid in order. Used for tests, CI machines without GPUs and as the default
//! device when no CUDA device is configured.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::driver::{ContextId, DevicePtr, Driver};
use crate::kernels::KernelCall;
use crate::launch::LaunchDims;
use crate::memset::FillPattern;
use crate::{DeviceError, Result};

static NEXT_CONTEXT: AtomicU32 = AtomicU32::new(0);

const BASE_ADDR: u64 = 0x1000_0000;
const ALIGN: u64 = 256;

/// Counters describing driver activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub allocs: usize,
    pub deallocs: usize,
    pub live_allocations: usize,
    pub bytes_in_use: usize,
    pub launches: usize,
}

struct Region {
    data: Vec<u8>,
    foreign: bool,
}

struct State {
    next_addr: u64,
    regions: BTreeMap<u64, Region>,
    stats: DriverStats,
    fail_deallocs: bool,
}

impl State {
    fn bytes_mut(&mut self, ptr: DevicePtr, len: usize, what: &str) -> Result<&mut [u8]> {
        let (base, region) = self
            .regions
            .range_mut(..=ptr.0)
            .next_back()
            .ok_or_else(|| DeviceError::driver(what, format!("unmapped address {ptr}")))?;
        let start = (ptr.0 - *base) as usize;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= region.data.len())
            .ok_or_else(|| {
                DeviceError::driver(
                    what,
                    format!("{len} bytes at {ptr} exceed mapping at {:#x}", base),
                )
            })?;
        Ok(&mut region.data[start..end])
    }

    fn map(&mut self, len: usize, foreign: bool) -> DevicePtr {
        let addr = self.next_addr;
        let span = (len as u64).div_ceil(ALIGN) * ALIGN;
        // Leave a gap so neighbouring regions never look contiguous.
        self.next_addr += span + ALIGN;
        self.regions.insert(
            addr,
            Region {
                data: vec![0u8; len],
                foreign,
            },
        );
        DevicePtr(addr)
    }
}

/// Host-memory implementation of [`Driver`].
pub struct EmulatedDriver {
    context: ContextId,
    memory_limit: Option<usize>,
    state: Mutex<State>,
}

impl EmulatedDriver {
    /// A new emulated device with its own context id and no memory limit.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A new emulated device that refuses allocations beyond `limit` bytes in use.
    pub fn with_memory_limit(limit: usize) -> Self {
        Self::build(Some(limit))
    }

    fn build(memory_limit: Option<usize>) -> Self {
        let id = NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed);
        Self {
            context: ContextId::Emulated(id),
            memory_limit,
            state: Mutex::new(State {
                next_addr: BASE_ADDR,
                regions: BTreeMap::new(),
                stats: DriverStats::default(),
                fail_deallocs: false,
            }),
        }
    }

    /// Map `len` zeroed bytes that this driver does not own, as if pinned by
    /// another library. They never count as allocations and cannot be freed.
    pub fn register_foreign(&self, len: usize) -> DevicePtr {
        self.state.lock().map(len, true)
    }

    /// Whether a mapping starts at `ptr`.
    pub fn is_mapped(&self, ptr: DevicePtr) -> bool {
        self.state.lock().regions.contains_key(&ptr.0)
    }

    /// Make every subsequent `dealloc` fail with a driver error.
    pub fn fail_deallocs(&self, fail: bool) {
        self.state.lock().fail_deallocs = fail;
    }

    /// Snapshot of the activity counters.
    pub fn stats(&self) -> DriverStats {
        self.state.lock().stats
    }
}

impl Default for EmulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EmulatedDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmulatedDriver")
            .field("context", &self.context)
            .field("memory_limit", &self.memory_limit)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Driver for EmulatedDriver {
    fn name(&self) -> &'static str {
        "emulated"
    }

    fn context(&self) -> ContextId {
        self.context
    }

    fn alloc(&self, nbytes: usize) -> Result<DevicePtr> {
        let mut state = self.state.lock();
        if let Some(limit) = self.memory_limit {
            let requested = state.stats.bytes_in_use.saturating_add(nbytes);
            if requested > limit {
                return Err(DeviceError::Allocation {
                    nbytes,
                    msg: format!(
                        "out of memory ({} of {} bytes in use)",
                        state.stats.bytes_in_use, limit
                    ),
                });
            }
        }
        let ptr = state.map(nbytes, false);
        state.stats.allocs += 1;
        state.stats.live_allocations += 1;
        state.stats.bytes_in_use += nbytes;
        Ok(ptr)
    }

    fn dealloc(&self, ptr: DevicePtr, nbytes: usize) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_deallocs {
            return Err(DeviceError::driver("dealloc", "injected failure"));
        }
        match state.regions.get(&ptr.0) {
            None => return Err(DeviceError::driver("dealloc", format!("unmapped address {ptr}"))),
            Some(r) if r.foreign => {
                return Err(DeviceError::driver(
                    "dealloc",
                    format!("{ptr} was not allocated by this driver"),
                ))
            }
            Some(r) if r.data.len() != nbytes => {
                return Err(DeviceError::driver(
                    "dealloc",
                    format!("size {nbytes} does not match allocation of {}", r.data.len()),
                ))
            }
            Some(_) => {}
        }
        state.regions.remove(&ptr.0);
        state.stats.deallocs += 1;
        state.stats.live_allocations -= 1;
        state.stats.bytes_in_use -= nbytes;
        Ok(())
    }

    fn upload(&self, dst: DevicePtr, src: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.bytes_mut(dst, src.len(), "upload")?.copy_from_slice(src);
        Ok(())
    }

    fn download(&self, dst: &mut [u8], src: DevicePtr) -> Result<()> {
        let mut state = self.state.lock();
        dst.copy_from_slice(state.bytes_mut(src, dst.len(), "download")?);
        Ok(())
    }

    fn device_transfer(&self, dst: DevicePtr, src: DevicePtr, nbytes: usize) -> Result<()> {
        let mut state = self.state.lock();
        let staged = state.bytes_mut(src, nbytes, "device_transfer")?.to_vec();
        state
            .bytes_mut(dst, nbytes, "device_transfer")?
            .copy_from_slice(&staged);
        Ok(())
    }

    fn memset(&self, dst: DevicePtr, pattern: FillPattern, count: usize) -> Result<()> {
        let mut state = self.state.lock();
        let nbytes = count * pattern.width();
        pattern.apply(state.bytes_mut(dst, nbytes, "memset")?);
        Ok(())
    }

    fn launch(&self, dims: LaunchDims, call: KernelCall) -> Result<()> {
        let mut state = self.state.lock();
        for tid in 0..dims.threads() {
            if let Some(write) = call.element_write(tid) {
                state
                    .bytes_mut(write.addr, write.width, "launch")?
                    .copy_from_slice(write.data());
            }
        }
        state.stats.launches += 1;
        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        Ok(())
    }
}
