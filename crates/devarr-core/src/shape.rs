use smallvec::SmallVec;
use std::fmt;

/// Checked product of extents. `None` on overflow.
///
/// Any zero extent makes the count 0, whatever the other extents are.
pub fn checked_numel(dims: &[usize]) -> Option<usize> {
    if dims.contains(&0) {
        return Some(0);
    }
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// Row-major strides (in elements) for contiguous extents.
pub fn row_major_strides<const N: usize>(dims: &[usize; N]) -> [usize; N] {
    let mut strides = [0usize; N];
    let mut acc = 1usize;
    for i in (0..N).rev() {
        strides[i] = acc;
        acc = acc.saturating_mul(dims[i]);
    }
    strides
}

/// A shape of any rank, with stack storage for ≤4 dimensions.
///
/// Array views carry their extents as `[usize; N]`; this type describes
/// shapes whose rank is only known at runtime, such as reshape targets in
/// error messages.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: SmallVec<[usize; 4]>,
}

impl Shape {
    /// Create a new shape from dimensions.
    pub fn new(dims: &[usize]) -> Self {
        Self {
            dims: SmallVec::from_slice(dims),
        }
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({:?})", self.dims.as_slice())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        if self.dims.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}
