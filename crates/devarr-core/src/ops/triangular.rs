use devarr_kernels::{launch_elementwise, DeviceError, KernelCall, TriangleMode, TriangularParams};

use crate::dtype::Element;
use crate::{GpuArray, Result};

impl<T: Element> GpuArray<T, 2> {
    pub fn rows(&self) -> usize {
        self.shape()[0]
    }

    pub fn cols(&self) -> usize {
        self.shape()[1]
    }

    /// Zero every element strictly on the excluded side of the diagonal
    /// shifted right by `diagonal`.
    ///
    /// Element `(r, c)` (0-based, row-major) is zeroed when `c > r + diagonal`
    /// for [`TriangleMode::LowerExcludingAbove`] and when `c < r + diagonal`
    /// for [`TriangleMode::UpperExcludingBelow`].
    pub fn triangular_zero(&self, diagonal: i64, mode: TriangleMode) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let dim = |n: usize| {
            u32::try_from(n).map_err(|_| {
                DeviceError::Launch(format!("matrix extent {n} exceeds u32::MAX"))
            })
        };
        let params = TriangularParams {
            data: self.buffer().ptr().byte_add(self.byte_offset()),
            rows: dim(self.rows())?,
            cols: dim(self.cols())?,
            elem_size: self.element_size() as u32,
            diagonal,
            mode,
        };
        launch_elementwise(self.buffer().driver().as_ref(), KernelCall::TriangularMask(params))?;
        Ok(())
    }

    /// Keep the lower triangle up to diagonal `k`.
    pub fn tril_in_place(&self, k: i64) -> Result<()> {
        self.triangular_zero(k, TriangleMode::LowerExcludingAbove)
    }

    /// Keep the upper triangle from diagonal `k`.
    pub fn triu_in_place(&self, k: i64) -> Result<()> {
        self.triangular_zero(k, TriangleMode::UpperExcludingBelow)
    }
}
