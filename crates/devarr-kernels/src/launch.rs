//! Launch geometry and elementwise dispatch.

use crate::driver::Driver;
use crate::kernels::KernelCall;
use crate::{DeviceError, Result};

/// Default threads per block for 1-D elementwise launches.
pub const BLOCK_SIZE: u32 = 256;

/// Largest `gridDim.x` a CUDA launch accepts (2^31 - 1).
pub const MAX_GRID_X: u32 = i32::MAX as u32;

/// A 1-D grid of `grid` blocks of `block` threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchDims {
    pub grid: u32,
    pub block: u32,
}

impl LaunchDims {
    /// Smallest grid of `block`-sized blocks covering `n` threads.
    pub fn grid_1d(n: usize, block: u32) -> Result<Self> {
        if block == 0 {
            return Err(DeviceError::Launch("block size must be non-zero".into()));
        }
        let grid = n.div_ceil(block as usize);
        if grid > MAX_GRID_X as usize {
            return Err(DeviceError::Launch(format!(
                "{n} threads need {grid} blocks of {block}, more than the limit of {MAX_GRID_X}"
            )));
        }
        Ok(Self {
            grid: grid as u32,
            block,
        })
    }

    /// Total threads launched (may exceed the element count).
    pub fn threads(&self) -> u64 {
        self.grid as u64 * self.block as u64
    }
}

/// Launch `call` with one thread per element. Empty calls launch nothing.
pub fn launch_elementwise(driver: &dyn Driver, call: KernelCall) -> Result<()> {
    let n = call.elements();
    if n == 0 {
        return Ok(());
    }
    let dims = LaunchDims::grid_1d(n, BLOCK_SIZE)?;
    tracing::trace!(
        "launch {:?} over {} elements as {}x{} on {}",
        call.func_name(),
        n,
        dims.grid,
        dims.block,
        driver.context()
    );
    driver.launch(dims, call)
}
