use std::fmt;
use std::marker::PhantomData;

use devarr_kernels::{Allocator, ContextId, DeviceBuffer, DeviceError, DevicePtr, Ownership};

use crate::context::current_allocator;
use crate::dtype::{DType, Element};
use crate::error::DevarrError;
use crate::shape::{checked_numel, row_major_strides};
use crate::Result;

/// A typed, shaped window into a reference-counted device buffer.
///
/// Element type and rank are part of the type (`GpuArray<f32, 2>`). Views
/// are contiguous and row-major, starting `offset` elements into their
/// buffer. Many views may share one buffer; the buffer is freed when the
/// last view (or other handle) goes away.
///
/// Writes take `&self`: the contents live on the device and views that
/// alias the same bytes are allowed, with no overlap checking.
///
/// # Examples
///
/// ```
/// use devarr_core::{Allocator, GpuArray};
///
/// let alloc = Allocator::emulated();
/// let a = GpuArray::<i32, 2>::filled_in(&alloc, [2, 2], 7).unwrap();
/// let row = a.slice(2, 2).unwrap();
/// row.fill(0).unwrap();
/// assert_eq!(a.to_vec().unwrap(), vec![7, 7, 0, 0]);
/// ```
#[derive(Clone)]
pub struct GpuArray<T: Element, const N: usize> {
    buffer: DeviceBuffer,
    shape: [usize; N],
    offset: usize,
    _marker: PhantomData<T>,
}

/// Device address of an element plus the bytes remaining in its view.
///
/// A plain value for native-call interop; it neither allocates nor retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAddress {
    pub ptr: DevicePtr,
    /// Bytes from `ptr` to the end of the view.
    pub len: usize,
    pub context: ContextId,
}

fn byte_len<T: Element>(shape: &[usize]) -> Result<usize> {
    checked_numel(shape)
        .and_then(|n| n.checked_mul(T::DTYPE.element_size()))
        .ok_or_else(|| {
            DeviceError::Allocation {
                nbytes: usize::MAX,
                msg: format!("{:?} x {} overflows usize", shape, T::DTYPE),
            }
            .into()
        })
}

impl<T: Element, const N: usize> GpuArray<T, N> {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Allocate an array on the current thread's allocator.
    ///
    /// Contents are unspecified until written.
    pub fn new(shape: [usize; N]) -> Result<Self> {
        Self::new_in(&current_allocator()?, shape)
    }

    /// Allocate an array on `alloc`. Contents are unspecified until written.
    pub fn new_in(alloc: &Allocator, shape: [usize; N]) -> Result<Self> {
        let nbytes = byte_len::<T>(&shape)?;
        let buffer = alloc.allocate(nbytes)?;
        Ok(Self {
            buffer,
            shape,
            offset: 0,
            _marker: PhantomData,
        })
    }

    /// Allocate on `alloc` and zero every element.
    pub fn zeros_in(alloc: &Allocator, shape: [usize; N]) -> Result<Self> {
        Self::filled_in(alloc, shape, T::zeroed())
    }

    /// Allocate on the current allocator and set every element to `value`.
    pub fn filled(shape: [usize; N], value: T) -> Result<Self> {
        Self::filled_in(&current_allocator()?, shape, value)
    }

    /// Allocate on `alloc` and set every element to `value`.
    pub fn filled_in(alloc: &Allocator, shape: [usize; N], value: T) -> Result<Self> {
        let array = Self::new_in(alloc, shape)?;
        array.fill(value)?;
        Ok(array)
    }

    /// Upload row-major host data into a new array on the current allocator.
    pub fn from_host(data: &[T], shape: [usize; N]) -> Result<Self> {
        Self::from_host_in(&current_allocator()?, data, shape)
    }

    /// Upload row-major host data into a new array on `alloc`.
    pub fn from_host_in(alloc: &Allocator, data: &[T], shape: [usize; N]) -> Result<Self> {
        if checked_numel(&shape) != Some(data.len()) {
            return Err(DevarrError::shape_mismatch(data.len(), &shape));
        }
        let array = Self::new_in(alloc, shape)?;
        array.copy_from_host(data)?;
        Ok(array)
    }

    /// View an existing buffer, starting `offset` elements in.
    ///
    /// Takes one of the buffer's handles; fails if the view would run past
    /// the end of the buffer.
    pub fn from_buffer(buffer: DeviceBuffer, shape: [usize; N], offset: usize) -> Result<Self> {
        let elem = T::DTYPE.element_size();
        let needed = byte_len::<T>(&shape)?;
        let start = offset.checked_mul(elem);
        let fits = start
            .and_then(|s| s.checked_add(needed))
            .is_some_and(|end| end <= buffer.len());
        if !fits {
            return Err(DevarrError::ViewOutOfBounds {
                offset: start.unwrap_or(usize::MAX),
                needed,
                available: buffer.len(),
            });
        }
        Ok(Self {
            buffer,
            shape,
            offset,
            _marker: PhantomData,
        })
    }

    /// View device memory this library did not allocate.
    ///
    /// The memory is never freed by devarr. [`Ownership::Transfer`] is
    /// rejected with [`DeviceError::UnsupportedOperation`].
    pub fn wrap_foreign(
        alloc: &Allocator,
        ptr: DevicePtr,
        shape: [usize; N],
        ownership: Ownership,
    ) -> Result<Self> {
        let nbytes = byte_len::<T>(&shape)?;
        let buffer = alloc.wrap_foreign(ptr, nbytes, ownership)?;
        Self::from_buffer(buffer, shape, 0)
    }

    // =========================================================================
    // Shape & metadata
    // =========================================================================

    /// Extent of each dimension.
    pub fn shape(&self) -> &[usize; N] {
        &self.shape
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        // Construction checked that the count fits.
        checked_numel(&self.shape).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rank.
    pub fn ndim(&self) -> usize {
        N
    }

    /// Row-major strides in elements.
    pub fn strides(&self) -> [usize; N] {
        row_major_strides(&self.shape)
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    /// Size of one element in bytes.
    pub fn element_size(&self) -> usize {
        T::DTYPE.element_size()
    }

    /// Size of the view in bytes (not of the whole buffer).
    pub fn byte_size(&self) -> usize {
        self.len() * self.element_size()
    }

    /// Offset of the first element into the buffer, in elements.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Offset of the first element into the buffer, in bytes.
    pub fn byte_offset(&self) -> usize {
        self.offset * self.element_size()
    }

    /// The shared buffer behind this view.
    pub fn buffer(&self) -> &DeviceBuffer {
        &self.buffer
    }

    pub fn context(&self) -> ContextId {
        self.buffer.context()
    }

    /// Allocator on the same driver as this array's buffer.
    pub fn allocator(&self) -> Allocator {
        self.buffer.allocator()
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// View the same elements with a new shape.
    ///
    /// Shares the buffer and offset; fails unless the element counts match.
    pub fn reshape<const M: usize>(&self, shape: [usize; M]) -> Result<GpuArray<T, M>> {
        if checked_numel(&shape) != Some(self.len()) {
            return Err(DevarrError::shape_mismatch(self.len(), &shape));
        }
        Ok(GpuArray {
            buffer: self.buffer.clone(),
            shape,
            offset: self.offset,
            _marker: PhantomData,
        })
    }

    /// A contiguous run of `len` elements starting at flat index `start`.
    pub fn slice(&self, start: usize, len: usize) -> Result<GpuArray<T, 1>> {
        let end = start.checked_add(len).ok_or(DevarrError::IndexOutOfBounds {
            index: usize::MAX,
            len: self.len(),
        })?;
        if end > self.len() {
            return Err(DevarrError::IndexOutOfBounds {
                index: end,
                len: self.len(),
            });
        }
        Ok(GpuArray {
            buffer: self.buffer.clone(),
            shape: [len],
            offset: self.offset + start,
            _marker: PhantomData,
        })
    }

    /// A new, separately allocated array of the same type and shape.
    pub fn similar(&self) -> Result<Self> {
        Self::new_in(&self.allocator(), self.shape)
    }

    /// A new, separately allocated array with another element type and shape.
    pub fn similar_with<U: Element, const M: usize>(
        &self,
        shape: [usize; M],
    ) -> Result<GpuArray<U, M>> {
        GpuArray::new_in(&self.allocator(), shape)
    }

    /// Reinterpret as `GpuArray<U, M>` when that is the same type and rank.
    ///
    /// Returns this very view unchanged on success.
    pub fn into_compatible<U: Element, const M: usize>(self) -> Result<GpuArray<U, M>> {
        if U::DTYPE != T::DTYPE {
            return Err(DevarrError::TypeMismatch {
                expected: U::DTYPE,
                got: T::DTYPE,
            });
        }
        let shape: [usize; M] = self
            .shape
            .as_slice()
            .try_into()
            .map_err(|_| DevarrError::shape_mismatch(self.len(), &self.shape))?;
        Ok(GpuArray {
            buffer: self.buffer,
            shape,
            offset: self.offset,
            _marker: PhantomData,
        })
    }

    /// Device address of flat element `index` (0-based) and the bytes left
    /// in the view from there.
    ///
    /// `index == len()` is allowed and addresses the end of the view.
    pub fn device_address(&self, index: usize) -> Result<DeviceAddress> {
        let len = self.len();
        if index > len {
            return Err(DevarrError::IndexOutOfBounds { index, len });
        }
        let elem = self.element_size();
        Ok(DeviceAddress {
            ptr: self.buffer.ptr().byte_add((self.offset + index) * elem),
            len: (len - index) * elem,
            context: self.context(),
        })
    }
}

impl<T: Element, const N: usize> fmt::Debug for GpuArray<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuArray")
            .field("dtype", &T::DTYPE)
            .field("shape", &self.shape)
            .field("offset", &self.offset)
            .field("buffer", &self.buffer)
            .finish()
    }
}
