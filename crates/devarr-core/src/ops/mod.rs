//! Operations on [`GpuArray`](crate::GpuArray): transfers, fills and kernels.

pub mod copy;
pub mod fill;
pub mod triangular;
