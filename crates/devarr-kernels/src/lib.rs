//! # devarr-kernels
//!
//! Device memory and kernel dispatch for devarr.
//!
//! Provides:
//! - The [`Driver`] trait: the native alloc/free/copy/memset/launch surface
//! - Reference-counted [`DeviceBuffer`]s and their [`Allocator`]
//! - Blocking host↔device and device↔device transfers
//! - Memset fast-path fills and elementwise kernel dispatch
//! - A host-memory [`EmulatedDriver`]
//! - CUDA dispatch (behind `cuda` feature flag)

pub mod buffer;
pub mod driver;
pub mod emulated;
pub mod error;
pub mod kernels;
pub mod launch;
pub mod memset;
pub mod transfer;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use buffer::{Allocator, DeviceBuffer, Ownership};
pub use driver::{ContextId, DevicePtr, Driver};
pub use emulated::{DriverStats, EmulatedDriver};
pub use error::{DeviceError, Result};
pub use kernels::{FillParams, KernelCall, TriangleMode, TriangularParams};
pub use launch::{launch_elementwise, LaunchDims, BLOCK_SIZE, MAX_GRID_X};
pub use memset::FillPattern;
