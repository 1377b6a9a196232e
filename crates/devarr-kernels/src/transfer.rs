//! Host↔device and device↔device copies over byte ranges of buffers.
//!
//! All copies are blocking. Ranges are validated against the buffer length
//! and the host slice before any driver call.

use crate::buffer::DeviceBuffer;
use crate::Result;

/// Copy `src` into `dst` starting `dst_offset` bytes into the buffer.
pub fn upload(dst: &DeviceBuffer, dst_offset: usize, src: &[u8]) -> Result<()> {
    dst.check_range(dst_offset, src.len(), "upload")?;
    if src.is_empty() {
        return Ok(());
    }
    tracing::trace!("H2D {} bytes -> {}+{}", src.len(), dst.ptr(), dst_offset);
    dst.driver().upload(dst.ptr().byte_add(dst_offset), src)
}

/// Fill `dst` from the buffer starting `src_offset` bytes in.
pub fn download(dst: &mut [u8], src: &DeviceBuffer, src_offset: usize) -> Result<()> {
    src.check_range(src_offset, dst.len(), "download")?;
    if dst.is_empty() {
        return Ok(());
    }
    tracing::trace!("D2H {} bytes <- {}+{}", dst.len(), src.ptr(), src_offset);
    src.driver().download(dst, src.ptr().byte_add(src_offset))
}

/// Copy `nbytes` between two buffers, possibly on different contexts.
///
/// Same-context copies go straight through the driver; cross-context copies
/// are staged through host memory.
pub fn device_to_device(
    dst: &DeviceBuffer,
    dst_offset: usize,
    src: &DeviceBuffer,
    src_offset: usize,
    nbytes: usize,
) -> Result<()> {
    dst.check_range(dst_offset, nbytes, "device copy destination")?;
    src.check_range(src_offset, nbytes, "device copy source")?;
    if nbytes == 0 {
        return Ok(());
    }
    tracing::trace!(
        "D2D {} bytes {}+{} ({}) -> {}+{} ({})",
        nbytes,
        src.ptr(),
        src_offset,
        src.context(),
        dst.ptr(),
        dst_offset,
        dst.context()
    );
    if dst.context() == src.context() {
        dst.driver().device_transfer(
            dst.ptr().byte_add(dst_offset),
            src.ptr().byte_add(src_offset),
            nbytes,
        )
    } else {
        let mut staging = vec![0u8; nbytes];
        src.driver()
            .download(&mut staging, src.ptr().byte_add(src_offset))?;
        dst.driver().upload(dst.ptr().byte_add(dst_offset), &staging)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Allocator;
    use crate::DeviceError;

    #[test]
    fn test_roundtrip() {
        let alloc = Allocator::emulated();
        let buf = alloc.allocate(6).unwrap();
        upload(&buf, 0, &[1, 2, 3, 4, 5, 6]).unwrap();
        let mut out = [0u8; 4];
        download(&mut out, &buf, 2).unwrap();
        assert_eq!(out, [3, 4, 5, 6]);
    }

    #[test]
    fn test_bounds() {
        let alloc = Allocator::emulated();
        let buf = alloc.allocate(4).unwrap();
        assert!(matches!(upload(&buf, 2, &[0; 3]), Err(DeviceError::Transfer(_))));
        let mut out = [0u8; 5];
        assert!(matches!(download(&mut out, &buf, 0), Err(DeviceError::Transfer(_))));
    }

    #[test]
    fn test_empty_transfers_on_null_buffer() {
        let alloc = Allocator::emulated();
        let buf = alloc.allocate(0).unwrap();
        upload(&buf, 0, &[]).unwrap();
        download(&mut [], &buf, 0).unwrap();
        device_to_device(&buf, 0, &buf, 0, 0).unwrap();
    }

    #[test]
    fn test_same_context_copy() {
        let alloc = Allocator::emulated();
        let a = alloc.allocate(4).unwrap();
        let b = alloc.allocate(8).unwrap();
        upload(&a, 0, &[9, 8, 7, 6]).unwrap();
        upload(&b, 0, &[0; 8]).unwrap();
        device_to_device(&b, 3, &a, 1, 3).unwrap();
        let mut out = [0u8; 8];
        download(&mut out, &b, 0).unwrap();
        assert_eq!(out, [0, 0, 0, 8, 7, 6, 0, 0]);
    }

    #[test]
    fn test_cross_context_copy() {
        let first = Allocator::emulated();
        let second = Allocator::emulated();
        assert_ne!(first.context(), second.context());
        let a = first.allocate(3).unwrap();
        let b = second.allocate(3).unwrap();
        upload(&a, 0, &[1, 2, 3]).unwrap();
        device_to_device(&b, 0, &a, 0, 3).unwrap();
        let mut out = [0u8; 3];
        download(&mut out, &b, 0).unwrap();
        assert_eq!(out, [1, 2, 3]);
    }

    #[test]
    fn test_device_copy_bounds() {
        let alloc = Allocator::emulated();
        let a = alloc.allocate(4).unwrap();
        let b = alloc.allocate(2).unwrap();
        let err = device_to_device(&b, 0, &a, 0, 4).unwrap_err();
        assert!(matches!(err, DeviceError::Transfer(_)));
    }
}
