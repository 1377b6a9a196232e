//! Host↔device and device↔device copies between array views.
//!
//! Indices are flat, 0-based and relative to each view. Every range is
//! checked against its view before the transfer layer checks it again
//! against the whole buffer; both failures are transfer errors.

use devarr_kernels::{transfer, DeviceError};

use crate::dtype::Element;
use crate::{GpuArray, Result};

impl<T: Element, const N: usize> GpuArray<T, N> {
    /// Byte offset into the buffer and byte length of `count` elements
    /// starting at view index `start`.
    fn byte_range(&self, start: usize, count: usize, what: &str) -> Result<(usize, usize)> {
        let end = start.checked_add(count).filter(|&end| end <= self.len());
        if end.is_none() {
            return Err(DeviceError::Transfer(format!(
                "{what}: elements {start}..+{count} exceed view of {} elements",
                self.len()
            ))
            .into());
        }
        let elem = self.element_size();
        Ok(((self.offset() + start) * elem, count * elem))
    }

    /// Upload exactly `len()` elements from the host.
    pub fn copy_from_host(&self, data: &[T]) -> Result<()> {
        if data.len() != self.len() {
            return Err(DeviceError::Transfer(format!(
                "copy_from_host: {} host elements for a view of {}",
                data.len(),
                self.len()
            ))
            .into());
        }
        self.upload_range(0, data)
    }

    /// Download exactly `len()` elements into `out`.
    pub fn copy_to_host(&self, out: &mut [T]) -> Result<()> {
        if out.len() != self.len() {
            return Err(DeviceError::Transfer(format!(
                "copy_to_host: {} host elements for a view of {}",
                out.len(),
                self.len()
            ))
            .into());
        }
        self.download_range(0, out)
    }

    /// Download the whole view into a new vector.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        let mut out = vec![T::zeroed(); self.len()];
        self.download_range(0, &mut out)?;
        Ok(out)
    }

    /// Upload `data` to view elements `start..start + data.len()`.
    pub fn upload_range(&self, start: usize, data: &[T]) -> Result<()> {
        let (offset, _) = self.byte_range(start, data.len(), "upload")?;
        transfer::upload(self.buffer(), offset, bytemuck::cast_slice(data))?;
        Ok(())
    }

    /// Download view elements `start..start + out.len()` into `out`.
    pub fn download_range(&self, start: usize, out: &mut [T]) -> Result<()> {
        let (offset, _) = self.byte_range(start, out.len(), "download")?;
        transfer::download(bytemuck::cast_slice_mut(out), self.buffer(), offset)?;
        Ok(())
    }

    /// A new array with the same shape and contents in a fresh buffer.
    pub fn copy(&self) -> Result<Self> {
        let out = self.similar()?;
        out.copy_from(self)?;
        Ok(out)
    }

    /// Copy every element of `src` into this view.
    ///
    /// Ranks may differ; element counts must match. `src` may live on another
    /// device context.
    pub fn copy_from<const M: usize>(&self, src: &GpuArray<T, M>) -> Result<()> {
        if src.len() != self.len() {
            return Err(DeviceError::Transfer(format!(
                "copy_from: source has {} elements, destination {}",
                src.len(),
                self.len()
            ))
            .into());
        }
        self.copy_range_from(0, src, 0, self.len())
    }

    /// Copy `count` elements from `src[src_start..]` to `self[dst_start..]`.
    ///
    /// Overlapping ranges of one buffer are not detected.
    pub fn copy_range_from<const M: usize>(
        &self,
        dst_start: usize,
        src: &GpuArray<T, M>,
        src_start: usize,
        count: usize,
    ) -> Result<()> {
        let (dst_offset, nbytes) = self.byte_range(dst_start, count, "device copy destination")?;
        let (src_offset, _) = src.byte_range(src_start, count, "device copy source")?;
        transfer::device_to_device(self.buffer(), dst_offset, src.buffer(), src_offset, nbytes)?;
        Ok(())
    }
}
