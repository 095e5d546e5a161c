//! Little-endian packet encoding.
//!
//! Packets are flat byte strings: `u64` counts and ids followed by
//! contiguous runs of [`Real`] values. The reader is strict: every
//! read is bounds-checked and [`PacketReader::finish`] rejects trailing
//! bytes, so a packet of the wrong shape surfaces as
//! [`CommError::MalformedPacket`] rather than silently truncated data.

use slabtrace_core::{CommError, Real};

/// Append-only packet builder.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    /// Empty packet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty packet with `bytes` of reserved capacity.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(bytes),
        }
    }

    /// Append a `u64`.
    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Append one real value.
    pub fn put_real<R: Real>(&mut self, v: R) {
        v.write_le(&mut self.buf);
    }

    /// Append a run of real values (no length prefix).
    pub fn put_reals<R: Real>(&mut self, vs: &[R]) {
        self.buf.reserve(vs.len() * R::DTYPE.bytes());
        for &v in vs {
            v.write_le(&mut self.buf);
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the finished packet.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a received packet.
#[derive(Debug)]
pub struct PacketReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    /// Start reading at the beginning of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], CommError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| CommError::MalformedPacket {
                detail: format!(
                    "{what}: need {n} bytes at offset {}, packet has {}",
                    self.pos,
                    self.bytes.len()
                ),
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Read a `u64`.
    pub fn get_u64(&mut self) -> Result<u64, CommError> {
        let raw = self.take(8, "u64")?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(raw);
        Ok(u64::from_le_bytes(arr))
    }

    /// Read one real value.
    pub fn get_real<R: Real>(&mut self) -> Result<R, CommError> {
        let raw = self.take(R::DTYPE.bytes(), "real")?;
        R::read_le(raw).ok_or_else(|| CommError::MalformedPacket {
            detail: format!("bad {} encoding", R::DTYPE),
        })
    }

    /// Read `n` real values into `out` (appending).
    pub fn get_reals_into<R: Real>(&mut self, n: usize, out: &mut Vec<R>) -> Result<(), CommError> {
        let width = R::DTYPE.bytes();
        let bytes = n.checked_mul(width).ok_or_else(|| CommError::MalformedPacket {
            detail: format!("run of {n} values overflows"),
        })?;
        let raw = self.take(bytes, "real run")?;
        out.reserve(n);
        for chunk in raw.chunks_exact(width) {
            out.push(R::read_le(chunk).ok_or_else(|| CommError::MalformedPacket {
                detail: format!("bad {} encoding", R::DTYPE),
            })?);
        }
        Ok(())
    }

    /// Fill `out` with the next `out.len()` real values.
    pub fn get_reals_exact<R: Real>(&mut self, out: &mut [R]) -> Result<(), CommError> {
        let width = R::DTYPE.bytes();
        let raw = self.take(out.len() * width, "real run")?;
        for (slot, chunk) in out.iter_mut().zip(raw.chunks_exact(width)) {
            *slot = R::read_le(chunk).ok_or_else(|| CommError::MalformedPacket {
                detail: format!("bad {} encoding", R::DTYPE),
            })?;
        }
        Ok(())
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Require that the whole packet was consumed.
    pub fn finish(self) -> Result<(), CommError> {
        if self.pos != self.bytes.len() {
            return Err(CommError::MalformedPacket {
                detail: format!("{} trailing bytes", self.bytes.len() - self.pos),
            });
        }
        Ok(())
    }
}
