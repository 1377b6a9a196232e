//! Error types for device-level operations.

/// Result alias used throughout `devarr-kernels`.
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors raised by drivers, buffers, transfers and kernel launches.
///
/// None of these are retried internally; they propagate to the caller as soon
/// as they are detected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The device allocator could not satisfy a request.
    #[error("allocation of {nbytes} bytes failed: {msg}")]
    Allocation { nbytes: usize, msg: String },

    /// A copy's byte range is invalid for one of its endpoints.
    #[error("invalid transfer: {0}")]
    Transfer(String),

    /// The operation cannot be performed safely on this buffer.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The memset fast path only broadcasts 1, 2 or 4 byte patterns.
    #[error("memset fill does not support {width}-byte elements")]
    UnsupportedFillType { width: usize },

    /// Launch geometry or the launch itself failed.
    #[error("kernel launch failed: {0}")]
    Launch(String),

    /// The native driver reported an error.
    #[error("driver error in {context}: {msg}")]
    Driver { context: String, msg: String },

    /// No usable device for the requested context.
    #[error("device not available: {0}")]
    DeviceUnavailable(String),
}

impl DeviceError {
    pub(crate) fn driver(context: impl Into<String>, msg: impl ToString) -> Self {
        DeviceError::Driver {
            context: context.into(),
            msg: msg.to_string(),
        }
    }
}
