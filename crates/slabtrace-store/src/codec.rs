//! Binary encode/decode for stored datasets.
//!
//! A dataset is a flat array of one element type:
//!
//! ```text
//! [MAGIC "SLBT"] [VERSION u8] [ELEMENT u8] [COUNT u64] [VALUES ...]
//! ```
//!
//! All integers and values are little-endian with no padding. Values are
//! stored bit-for-bit, so a decoded buffer is identical to the encoded one.

use std::io::{Read, Write};

use slabtrace_core::{DType, Real};

use crate::error::StoreError;
use crate::{FORMAT_VERSION, MAGIC};

// ── Primitive writers ───────────────────────────────────────────

/// Write a single byte.
pub fn write_u8(w: &mut dyn Write, v: u8) -> Result<(), StoreError> {
    w.write_all(&[v])?;
    Ok(())
}

/// Write a little-endian u64.
pub fn write_u64_le(w: &mut dyn Write, v: u64) -> Result<(), StoreError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

// ── Primitive readers ───────────────────────────────────────────

/// Read a single byte.
pub fn read_u8(r: &mut dyn Read) -> Result<u8, StoreError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf).map_err(truncated)?;
    Ok(buf[0])
}

/// Read a little-endian u64.
pub fn read_u64_le(r: &mut dyn Read) -> Result<u64, StoreError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).map_err(truncated)?;
    Ok(u64::from_le_bytes(buf))
}

fn truncated(e: std::io::Error) -> StoreError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        StoreError::MalformedDataset {
            detail: "truncated header".to_string(),
        }
    } else {
        StoreError::Io(e)
    }
}

// ── Header ──────────────────────────────────────────────────────

/// Element type of a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Element {
    /// Floating-point values of the given precision.
    Real(DType),
    /// Unsigned 64-bit integers (particle ids).
    U64,
}

impl Element {
    /// On-disk tag.
    pub fn tag(self) -> u8 {
        match self {
            Self::Real(DType::F32) => 0x01,
            Self::Real(DType::F64) => 0x02,
            Self::U64 => 0x08,
        }
    }

    /// Decode an on-disk tag.
    pub fn from_tag(tag: u8) -> Result<Self, StoreError> {
        match tag {
            0x01 => Ok(Self::Real(DType::F32)),
            0x02 => Ok(Self::Real(DType::F64)),
            0x08 => Ok(Self::U64),
            _ => Err(StoreError::UnknownElement { tag }),
        }
    }

    /// Width of one element in bytes.
    pub fn width(self) -> usize {
        match self {
            Self::Real(dtype) => dtype.bytes(),
            Self::U64 => 8,
        }
    }
}

/// Dataset header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// Element type.
    pub element: Element,
    /// Number of elements that follow.
    pub count: u64,
}

/// Write magic, version, element tag, and count.
pub fn write_header(w: &mut dyn Write, header: Header) -> Result<(), StoreError> {
    w.write_all(&MAGIC)?;
    write_u8(w, FORMAT_VERSION)?;
    write_u8(w, header.element.tag())?;
    write_u64_le(w, header.count)?;
    Ok(())
}

/// Read and validate a dataset header.
pub fn read_header(r: &mut dyn Read) -> Result<Header, StoreError> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(truncated)?;
    if magic != MAGIC {
        return Err(StoreError::InvalidMagic);
    }
    let version = read_u8(r)?;
    if version != FORMAT_VERSION {
        return Err(StoreError::UnsupportedVersion { found: version });
    }
    let element = Element::from_tag(read_u8(r)?)?;
    let count = read_u64_le(r)?;
    Ok(Header { element, count })
}

/// Read exactly the payload a header announces, then require end of input.
fn read_payload(r: &mut dyn Read, header: Header) -> Result<Vec<u8>, StoreError> {
    let len = usize::try_from(header.count)
        .ok()
        .and_then(|n| n.checked_mul(header.element.width()))
        .ok_or_else(|| StoreError::MalformedDataset {
            detail: format!("element count {} overflows", header.count),
        })?;
    let mut payload = Vec::new();
    (&mut *r).take(len as u64).read_to_end(&mut payload)?;
    if payload.len() != len {
        return Err(StoreError::MalformedDataset {
            detail: format!("expected {len} payload bytes, found {}", payload.len()),
        });
    }
    let mut probe = [0u8; 1];
    if r.read(&mut probe)? != 0 {
        return Err(StoreError::MalformedDataset {
            detail: "trailing bytes after payload".to_string(),
        });
    }
    Ok(payload)
}

// ── Datasets ────────────────────────────────────────────────────

/// Encode a real-valued dataset.
pub fn encode_reals<R: Real>(w: &mut dyn Write, values: &[R]) -> Result<(), StoreError> {
    write_header(
        w,
        Header {
            element: Element::Real(R::DTYPE),
            count: values.len() as u64,
        },
    )?;
    let mut buf = Vec::with_capacity(values.len() * R::DTYPE.bytes());
    for &v in values {
        v.write_le(&mut buf);
    }
    w.write_all(&buf)?;
    Ok(())
}

/// Decode a real-valued dataset of precision `R`.
///
/// A dataset of the other precision is rejected rather than converted.
pub fn decode_reals<R: Real>(r: &mut dyn Read) -> Result<Vec<R>, StoreError> {
    let header = read_header(r)?;
    match header.element {
        Element::Real(found) if found == R::DTYPE => {}
        Element::Real(found) => {
            return Err(StoreError::DTypeMismatch {
                expected: R::DTYPE,
                found,
            })
        }
        Element::U64 => {
            return Err(StoreError::MalformedDataset {
                detail: "expected reals, found integers".to_string(),
            })
        }
    }
    let payload = read_payload(r, header)?;
    payload
        .chunks_exact(R::DTYPE.bytes())
        .map(|c| {
            R::read_le(c).ok_or_else(|| StoreError::MalformedDataset {
                detail: "short value".to_string(),
            })
        })
        .collect()
}

/// Encode an integer dataset.
pub fn encode_u64s(w: &mut dyn Write, values: &[u64]) -> Result<(), StoreError> {
    write_header(
        w,
        Header {
            element: Element::U64,
            count: values.len() as u64,
        },
    )?;
    let mut buf = Vec::with_capacity(values.len() * 8);
    for &v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    w.write_all(&buf)?;
    Ok(())
}

/// Decode an integer dataset.
pub fn decode_u64s(r: &mut dyn Read) -> Result<Vec<u64>, StoreError> {
    let header = read_header(r)?;
    if header.element != Element::U64 {
        return Err(StoreError::MalformedDataset {
            detail: "expected integers, found reals".to_string(),
        });
    }
    let payload = read_payload(r, header)?;
    Ok(payload
        .chunks_exact(8)
        .map(|c| {
            let mut b = [0u8; 8];
            b.copy_from_slice(c);
            u64::from_le_bytes(b)
        })
        .collect())
}
