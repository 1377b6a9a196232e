use devarr_kernels::DeviceError;

use crate::dtype::DType;
use crate::shape::Shape;

/// Errors raised by array construction and array operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DevarrError {
    /// A shape's element count does not match the data it describes.
    #[error("shape mismatch: {numel} elements cannot be viewed as {shape}")]
    ShapeMismatch { numel: usize, shape: Shape },

    /// A view would extend past the end of its buffer.
    #[error("view of {needed} bytes at byte offset {offset} exceeds buffer of {available} bytes")]
    ViewOutOfBounds {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Element index outside a view.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// An operation required a different element type.
    #[error("element type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: DType, got: DType },

    /// Invalid runtime configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Error from the device layer (allocation, transfer, fill, launch).
    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl DevarrError {
    pub(crate) fn shape_mismatch(numel: usize, dims: &[usize]) -> Self {
        DevarrError::ShapeMismatch {
            numel,
            shape: Shape::new(dims),
        }
    }
}
