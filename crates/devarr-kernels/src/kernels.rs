//! Elementwise kernel parameter structs and their per-thread bodies.
//!
//! Each kernel is one thread per element of a 1-D grid. A thread computes its
//! element from the global thread index, returns early when the index is past
//! the element count (grids round up to whole blocks), evaluates its predicate
//! and writes one element. `element_write` is that body; the emulated driver
//! runs it directly and `cuda/kernels/elementwise.cu` mirrors it.
//!
//! Matrices are addressed 0-based and row-major: thread `t` of a
//! `rows x cols` matrix owns element `(t / cols, t % cols)`.

use crate::driver::DevicePtr;
use crate::{DeviceError, Result};

/// Which side of the (shifted) diagonal a triangular mask keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriangleMode {
    /// Keep the lower triangle; zero elements strictly above the diagonal.
    LowerExcludingAbove,
    /// Keep the upper triangle; zero elements strictly below the diagonal.
    UpperExcludingBelow,
}

/// Parameters of the triangular zero-mask kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriangularParams {
    /// Address of element (0, 0).
    pub data: DevicePtr,
    pub rows: u32,
    pub cols: u32,
    /// Element width in bytes (1, 2, 4 or 8).
    pub elem_size: u32,
    /// Diagonal shift: 0 is the main diagonal, positive moves it right.
    pub diagonal: i64,
    pub mode: TriangleMode,
}

impl TriangularParams {
    /// Whether `(row, col)` lies strictly on the excluded side of the diagonal.
    pub fn zeroes(&self, row: i64, col: i64) -> bool {
        match self.mode {
            TriangleMode::LowerExcludingAbove => col > row + self.diagonal,
            TriangleMode::UpperExcludingBelow => col < row + self.diagonal,
        }
    }

    fn element_write(&self, tid: u64) -> Option<ElementWrite> {
        let n = self.rows as u64 * self.cols as u64;
        if tid >= n {
            return None;
        }
        let row = (tid / self.cols as u64) as i64;
        let col = (tid % self.cols as u64) as i64;
        if !self.zeroes(row, col) {
            return None;
        }
        Some(ElementWrite {
            addr: self.data.byte_add((tid * self.elem_size as u64) as usize),
            width: self.elem_size as usize,
            bytes: [0u8; 8],
        })
    }
}

/// Parameters of the per-element fill kernel.
///
/// Used for element widths the memset fast path cannot broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillParams {
    pub data: DevicePtr,
    pub count: u64,
    pub elem_size: u32,
    /// Element bits, zero-extended to 64 bits.
    pub value: u64,
}

impl FillParams {
    /// Fill parameters for the native-endian bytes of one element.
    pub fn new(data: DevicePtr, count: usize, element: &[u8]) -> Result<Self> {
        let value = match element.len() {
            1 => element[0] as u64,
            2 => bytemuck::pod_read_unaligned::<u16>(element) as u64,
            4 => bytemuck::pod_read_unaligned::<u32>(element) as u64,
            8 => bytemuck::pod_read_unaligned::<u64>(element),
            width => {
                return Err(DeviceError::Launch(format!(
                    "fill kernel has no variant for {width}-byte elements"
                )))
            }
        };
        Ok(Self {
            data,
            count: count as u64,
            elem_size: element.len() as u32,
            value,
        })
    }

    fn element_write(&self, tid: u64) -> Option<ElementWrite> {
        if tid >= self.count {
            return None;
        }
        Some(ElementWrite {
            addr: self.data.byte_add((tid * self.elem_size as u64) as usize),
            width: self.elem_size as usize,
            bytes: element_bytes(self.value, self.elem_size as usize),
        })
    }
}

/// A single element store produced by one kernel thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementWrite {
    pub addr: DevicePtr,
    pub width: usize,
    /// The first `width` bytes are stored.
    pub bytes: [u8; 8],
}

impl ElementWrite {
    /// Bytes written to `addr`.
    pub fn data(&self) -> &[u8] {
        &self.bytes[..self.width]
    }
}

fn element_bytes(value: u64, width: usize) -> [u8; 8] {
    let mut out = [0u8; 8];
    match width {
        1 => out[..1].copy_from_slice(&(value as u8).to_ne_bytes()),
        2 => out[..2].copy_from_slice(&(value as u16).to_ne_bytes()),
        4 => out[..4].copy_from_slice(&(value as u32).to_ne_bytes()),
        _ => out.copy_from_slice(&value.to_ne_bytes()),
    }
    out
}

/// A kernel launch request with its parameters passed by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelCall {
    TriangularMask(TriangularParams),
    Fill(FillParams),
}

impl KernelCall {
    /// Number of logical threads that do work.
    pub fn elements(&self) -> usize {
        match self {
            KernelCall::TriangularMask(p) => p.rows as usize * p.cols as usize,
            KernelCall::Fill(p) => p.count as usize,
        }
    }

    /// Element width the kernel operates on.
    pub fn elem_size(&self) -> usize {
        match self {
            KernelCall::TriangularMask(p) => p.elem_size as usize,
            KernelCall::Fill(p) => p.elem_size as usize,
        }
    }

    /// Body of thread `tid`: the store it performs, if any.
    pub fn element_write(&self, tid: u64) -> Option<ElementWrite> {
        match self {
            KernelCall::TriangularMask(p) => p.element_write(tid),
            KernelCall::Fill(p) => p.element_write(tid),
        }
    }

    /// Name of the device function implementing this call.
    pub fn func_name(&self) -> Result<&'static str> {
        let name = match (self, self.elem_size()) {
            (KernelCall::TriangularMask(_), 1) => "tri_mask_u8",
            (KernelCall::TriangularMask(_), 2) => "tri_mask_u16",
            (KernelCall::TriangularMask(_), 4) => "tri_mask_u32",
            (KernelCall::TriangularMask(_), 8) => "tri_mask_u64",
            (KernelCall::Fill(_), 1) => "fill_u8",
            (KernelCall::Fill(_), 2) => "fill_u16",
            (KernelCall::Fill(_), 4) => "fill_u32",
            (KernelCall::Fill(_), 8) => "fill_u64",
            (_, w) => {
                return Err(DeviceError::Launch(format!(
                    "no kernel variant for {w}-byte elements"
                )))
            }
        };
        Ok(name)
    }
}
