//! The [`Real`] numeric trait and its on-wire type tag.

use std::fmt;

use num_traits::{Float, FromPrimitive, ToPrimitive};

/// Storage type tag for real-valued buffers.
///
/// Written into dataset headers so a reader can reject a buffer recorded
/// at a different precision instead of reinterpreting its bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    /// IEEE-754 binary32.
    F32,
    /// IEEE-754 binary64.
    F64,
}

impl DType {
    /// Width of one element in bytes.
    pub fn bytes(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F32 => write!(f, "f32"),
            Self::F64 => write!(f, "f64"),
        }
    }
}

/// Floating-point precision used for field samples and particle state.
///
/// Field storage and particle state are specialised independently: a
/// single-precision field may drive double-precision particles. All
/// stencil accumulation happens in `f64`, so the only conversions are
/// [`widen`](Real::widen) on read and [`cast`](Real::cast) on write.
pub trait Real:
    Float + FromPrimitive + ToPrimitive + Default + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Type tag recorded in persisted buffers.
    const DTYPE: DType;

    /// Convert from `f64`, rounding to nearest when narrowing.
    fn cast(v: f64) -> Self;

    /// Convert to `f64` without loss.
    fn widen(self) -> f64;

    /// Append the little-endian encoding of `self` to `out`.
    fn write_le(self, out: &mut Vec<u8>);

    /// Decode one value from exactly `DTYPE.bytes()` little-endian bytes.
    ///
    /// Returns `None` if `bytes` has the wrong length.
    fn read_le(bytes: &[u8]) -> Option<Self>;
}

impl Real for f32 {
    const DTYPE: DType = DType::F32;

    fn cast(v: f64) -> Self {
        v as f32
    }

    fn widen(self) -> f64 {
        f64::from(self)
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 4] = bytes.try_into().ok()?;
        Some(f32::from_le_bytes(arr))
    }
}

impl Real for f64 {
    const DTYPE: DType = DType::F64;

    fn cast(v: f64) -> Self {
        v
    }

    fn widen(self) -> f64 {
        self
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 8] = bytes.try_into().ok()?;
        Some(f64::from_le_bytes(arr))
    }
}
