//! # devarr-core
//!
//! GPU-resident N-dimensional arrays for devarr.
//!
//! Provides the [`GpuArray`] view type with:
//! - Element type and rank fixed in the type (`GpuArray<f32, 2>`)
//! - Many views sharing one reference-counted device buffer
//! - Zero-copy reshape and flat sub-views
//! - Blocking host↔device and device↔device copies
//! - Memset fills with a per-element kernel fallback
//! - Triangular zero-masking of matrices on the device
//!
//! # Examples
//!
//! ```
//! use devarr_core::{Allocator, GpuArray};
//!
//! let alloc = Allocator::emulated();
//! let a = GpuArray::<f32, 2>::from_host_in(&alloc, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [2, 3]).unwrap();
//! let flat = a.reshape([6]).unwrap();
//! assert_eq!(flat.shape(), &[6]);
//! assert!(flat.buffer().same_buffer(a.buffer()));
//! assert_eq!(flat.to_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! ```

pub mod array;
pub mod config;
pub mod context;
pub mod device;
pub mod dtype;
pub mod error;
pub mod ops;
pub mod shape;

pub use array::{DeviceAddress, GpuArray};
pub use config::RuntimeConfig;
pub use context::{current_allocator, set_current_allocator, with_allocator};
pub use device::Device;
pub use dtype::{DType, Element, MemsetElement};
pub use error::DevarrError;
pub use shape::Shape;

pub use devarr_kernels::{
    Allocator, ContextId, DeviceBuffer, DeviceError, DevicePtr, Driver, DriverStats,
    EmulatedDriver, FillPattern, Ownership, TriangleMode,
};

pub type Result<T> = std::result::Result<T, DevarrError>;

/// One-dimensional device array.
pub type GpuVector<T> = GpuArray<T, 1>;

/// Two-dimensional device array.
pub type GpuMatrix<T> = GpuArray<T, 2>;
