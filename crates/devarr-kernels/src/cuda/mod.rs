//! CUDA backend for devarr.
//!
//! Provides:
//! - Device context management (lazy singleton per GPU)
//! - A [`Driver`](crate::Driver) implementation over the CUDA driver API
//! - Kernel launcher with NVRTC compilation and per-device module caching

pub mod context;
pub mod driver;
pub mod launch;

pub use context::{device_count, get_device, is_cuda_available};
pub use driver::CudaDriver;
