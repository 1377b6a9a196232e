use std::fmt;

use devarr_kernels::FillPattern;
use half::{bf16, f16};

/// Element types a [`GpuArray`](crate::GpuArray) can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 8-bit unsigned integer
    U8,
    /// 8-bit signed integer
    I8,
    /// 16-bit unsigned integer
    U16,
    /// 16-bit signed integer
    I16,
    /// 16-bit IEEE 754 half-precision float
    F16,
    /// 16-bit Brain Float
    BF16,
    /// 32-bit unsigned integer
    U32,
    /// 32-bit signed integer
    I32,
    /// 32-bit IEEE 754 single-precision float
    F32,
    /// 64-bit unsigned integer
    U64,
    /// 64-bit signed integer
    I64,
    /// 64-bit IEEE 754 double-precision float
    F64,
}

impl DType {
    /// Size in bytes of a single element.
    pub fn element_size(&self) -> usize {
        match self {
            DType::U8 | DType::I8 => 1,
            DType::U16 | DType::I16 | DType::F16 | DType::BF16 => 2,
            DType::U32 | DType::I32 | DType::F32 => 4,
            DType::U64 | DType::I64 | DType::F64 => 8,
        }
    }

    /// Whether a fill of this type can be a single memset.
    pub fn supports_memset(&self) -> bool {
        matches!(self.element_size(), 1 | 2 | 4)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::U8 => "u8",
            DType::I8 => "i8",
            DType::U16 => "u16",
            DType::I16 => "i16",
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::U32 => "u32",
            DType::I32 => "i32",
            DType::F32 => "f32",
            DType::U64 => "u64",
            DType::I64 => "i64",
            DType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// A plain-old-data type that can live in device memory.
pub trait Element: bytemuck::Pod + PartialEq + fmt::Debug + Send + Sync + 'static {
    const DTYPE: DType;
}

/// Element types whose fill is a single memset of their bit pattern.
///
/// Implemented for the 8/16/32-bit integers and the 16/32-bit floats only, so
/// [`GpuArray::fill_memset`](crate::GpuArray::fill_memset) on anything else
/// fails to compile.
pub trait MemsetElement: Element {
    /// The element's bits as an unsigned pattern of the same width.
    fn fill_pattern(self) -> FillPattern;
}

macro_rules! impl_element {
    ($($t:ty => $d:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const DTYPE: DType = DType::$d;
            }
        )*
    };
}

impl_element!(
    u8 => U8, i8 => I8,
    u16 => U16, i16 => I16, f16 => F16, bf16 => BF16,
    u32 => U32, i32 => I32, f32 => F32,
    u64 => U64, i64 => I64, f64 => F64,
);

macro_rules! impl_memset_int {
    ($($t:ty => $variant:ident as $u:ty),* $(,)?) => {
        $(
            impl MemsetElement for $t {
                fn fill_pattern(self) -> FillPattern {
                    FillPattern::$variant(self as $u)
                }
            }
        )*
    };
}

impl_memset_int!(
    u8 => U8 as u8, i8 => U8 as u8,
    u16 => U16 as u16, i16 => U16 as u16,
    u32 => U32 as u32, i32 => U32 as u32,
);

impl MemsetElement for f16 {
    fn fill_pattern(self) -> FillPattern {
        FillPattern::U16(self.to_bits())
    }
}

impl MemsetElement for bf16 {
    fn fill_pattern(self) -> FillPattern {
        FillPattern::U16(self.to_bits())
    }
}

impl MemsetElement for f32 {
    fn fill_pattern(self) -> FillPattern {
        FillPattern::U32(self.to_bits())
    }
}
