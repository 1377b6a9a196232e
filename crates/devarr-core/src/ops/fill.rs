//! Fills: one memset for 1/2/4-byte elements, the fill kernel otherwise.

use devarr_kernels::{launch_elementwise, memset, FillParams, KernelCall};

use crate::dtype::{Element, MemsetElement};
use crate::{GpuArray, Result};

impl<T: Element, const N: usize> GpuArray<T, N> {
    /// Set every element of the view to `value`.
    ///
    /// 1, 2 and 4-byte elements are broadcast with a single memset; wider
    /// elements are written by the per-element fill kernel.
    pub fn fill(&self, value: T) -> Result<()> {
        let element = bytemuck::bytes_of(&value);
        if T::DTYPE.supports_memset() {
            memset::fill_bytes(self.buffer(), self.byte_offset(), element, self.len())?;
            return Ok(());
        }
        self.buffer()
            .check_range(self.byte_offset(), self.byte_size(), "fill")?;
        let data = self.buffer().ptr().byte_add(self.byte_offset());
        let params = FillParams::new(data, self.len(), element)?;
        launch_elementwise(self.buffer().driver().as_ref(), KernelCall::Fill(params))?;
        Ok(())
    }

    /// Set every element with one memset of the value's bit pattern.
    ///
    /// Only available for element types with a memset width.
    pub fn fill_memset(&self, value: T) -> Result<()>
    where
        T: MemsetElement,
    {
        memset::fill(self.buffer(), self.byte_offset(), value.fill_pattern(), self.len())?;
        Ok(())
    }
}
