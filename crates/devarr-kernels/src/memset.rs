//! Bulk fill through the driver's memset primitive.

use crate::buffer::DeviceBuffer;
use crate::{DeviceError, Result};

/// A 1, 2 or 4 byte pattern broadcast by a single memset call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPattern {
    U8(u8),
    U16(u16),
    U32(u32),
}

impl FillPattern {
    /// Reinterpret the native-endian bytes of one element as a pattern.
    ///
    /// Fails with [`DeviceError::UnsupportedFillType`] for any other width.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            1 => Ok(FillPattern::U8(bytes[0])),
            2 => Ok(FillPattern::U16(bytemuck::pod_read_unaligned(bytes))),
            4 => Ok(FillPattern::U32(bytemuck::pod_read_unaligned(bytes))),
            width => Err(DeviceError::UnsupportedFillType { width }),
        }
    }

    /// Element width in bytes.
    pub fn width(&self) -> usize {
        match self {
            FillPattern::U8(_) => 1,
            FillPattern::U16(_) => 2,
            FillPattern::U32(_) => 4,
        }
    }

    /// Write the pattern over every element of `dst` (host-side).
    pub fn apply(&self, dst: &mut [u8]) {
        match *self {
            FillPattern::U8(v) => dst.fill(v),
            FillPattern::U16(v) => {
                for chunk in dst.chunks_exact_mut(2) {
                    chunk.copy_from_slice(&v.to_ne_bytes());
                }
            }
            FillPattern::U32(v) => {
                for chunk in dst.chunks_exact_mut(4) {
                    chunk.copy_from_slice(&v.to_ne_bytes());
                }
            }
        }
    }
}

/// Fill `count` elements of `pattern` starting `byte_offset` into `buffer`.
pub fn fill(
    buffer: &DeviceBuffer,
    byte_offset: usize,
    pattern: FillPattern,
    count: usize,
) -> Result<()> {
    let nbytes = count.checked_mul(pattern.width()).ok_or_else(|| {
        DeviceError::Transfer(format!("memset of {count} elements overflows"))
    })?;
    buffer.check_range(byte_offset, nbytes, "memset")?;
    if count == 0 {
        return Ok(());
    }
    tracing::trace!(
        "memset {:?} x{} at {}+{}",
        pattern,
        count,
        buffer.ptr(),
        byte_offset
    );
    buffer
        .driver()
        .memset(buffer.ptr().byte_add(byte_offset), pattern, count)
}

/// Fill with the raw bytes of one element; widths outside 1/2/4 are rejected.
pub fn fill_bytes(
    buffer: &DeviceBuffer,
    byte_offset: usize,
    element: &[u8],
    count: usize,
) -> Result<()> {
    let pattern = FillPattern::from_bytes(element)?;
    fill(buffer, byte_offset, pattern, count)
}
