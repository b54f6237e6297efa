//! Binary primitives
//!
//! Zig-zag varints for int/long, little-endian IEEE-754 floats, and
//! length-prefixed bytes. Writers append to a `Vec<u8>`; [`Reader`] is a
//! cursor over a borrowed slice and reports every overrun as a malformed
//! message. [`Limits`] bound how deep and how large a decoded value may get.

use crate::error::{CodecError, Result};

/// Longest varint encoding of a 32-bit value
pub const MAX_INT_BYTES: usize = 5;

/// Longest varint encoding of a 64-bit value
pub const MAX_LONG_BYTES: usize = 10;

// =============================================================================
// Writers
// =============================================================================

/// Zig-zag map a signed value so small magnitudes get short encodings
pub fn zig_zag(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Inverse of [`zig_zag`]
pub fn unzig_zag(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Write an unsigned base-128 varint, least significant group first
pub fn write_varint(mut n: u64, out: &mut Vec<u8>) {
    while n >= 0x80 {
        out.push((n as u8 & 0x7f) | 0x80);
        n >>= 7;
    }
    out.push(n as u8);
}

pub fn write_long(n: i64, out: &mut Vec<u8>) {
    write_varint(zig_zag(n), out);
}

pub fn write_int(n: i32, out: &mut Vec<u8>) {
    write_long(n as i64, out);
}

pub fn write_boolean(b: bool, out: &mut Vec<u8>) {
    out.push(b as u8);
}

pub fn write_float(f: f32, out: &mut Vec<u8>) {
    out.extend_from_slice(&f.to_le_bytes());
}

pub fn write_double(f: f64, out: &mut Vec<u8>) {
    out.extend_from_slice(&f.to_le_bytes());
}

/// Write a `long` length followed by the raw bytes
pub fn write_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    write_long(bytes.len() as i64, out);
    out.extend_from_slice(bytes);
}

pub fn write_string(s: &str, out: &mut Vec<u8>) {
    write_bytes(s.as_bytes(), out);
}

// =============================================================================
// Limits
// =============================================================================

/// Default nesting bound for one value
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Default bound on array and map items in one value
pub const DEFAULT_MAX_COLLECTION_ITEMS: usize = 1 << 22;

/// Bounds applied while walking a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Deepest nesting of schema nodes, counted from the root value
    pub max_depth: usize,
    /// Total array and map items across one value
    pub max_collection_items: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_collection_items: DEFAULT_MAX_COLLECTION_ITEMS,
        }
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Cursor over an encoded buffer
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    limits: Limits,
    depth: usize,
    items: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_limits(buf, Limits::default())
    }

    pub fn with_limits(buf: &'a [u8], limits: Limits) -> Self {
        Self {
            buf,
            pos: 0,
            limits,
            depth: 0,
            items: 0,
        }
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Current nesting depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Step one level into a nested value
    pub fn enter(&mut self) -> Result<()> {
        if self.depth >= self.limits.max_depth {
            return Err(CodecError::malformed(format!(
                "value nests deeper than {} levels at offset {}",
                self.limits.max_depth, self.pos
            )));
        }
        self.depth += 1;
        Ok(())
    }

    /// Step back out of a nested value
    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Account for a block of `count` collection items, each at least
    /// `item_width` bytes long
    pub fn claim_items(&mut self, count: u64, item_width: usize) -> Result<()> {
        if count.saturating_mul(item_width as u64) > self.remaining() as u64 {
            return Err(CodecError::malformed(format!(
                "block of {} items cannot fit in {} remaining bytes at offset {}",
                count,
                self.remaining(),
                self.pos
            )));
        }
        let total = usize::try_from(count)
            .ok()
            .and_then(|count| self.items.checked_add(count))
            .filter(|total| *total <= self.limits.max_collection_items)
            .ok_or_else(|| {
                CodecError::malformed(format!(
                    "more than {} collection items in one value",
                    self.limits.max_collection_items
                ))
            })?;
        self.items = total;
        Ok(())
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Take exactly `n` bytes
    pub fn read_exact(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(CodecError::malformed(format!(
                "truncated: needed {} bytes at offset {}, {} available",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Advance past `n` bytes without looking at them
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.read_exact(n).map(|_| ())
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        Ok(self.read_exact(1)?[0])
    }

    /// Read a varint of at most `max_bytes` bytes
    pub fn read_varint(&mut self, max_bytes: usize) -> Result<u64> {
        let mut value = 0u64;
        for i in 0..max_bytes {
            let byte = self.read_byte()?;
            if i == MAX_LONG_BYTES - 1 && byte > 1 {
                return Err(CodecError::malformed("varint overflows 64 bits"));
            }
            value |= ((byte & 0x7f) as u64) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::malformed(format!(
            "varint continues past {} bytes at offset {}",
            max_bytes, self.pos
        )))
    }

    pub fn read_long(&mut self) -> Result<i64> {
        self.read_varint(MAX_LONG_BYTES).map(unzig_zag)
    }

    pub fn read_int(&mut self) -> Result<i32> {
        let n = unzig_zag(self.read_varint(MAX_INT_BYTES)?);
        i32::try_from(n).map_err(|_| CodecError::malformed(format!("int value {} overflows 32 bits", n)))
    }

    pub fn read_boolean(&mut self) -> Result<bool> {
        match self.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::malformed(format!("invalid boolean byte {:#04x}", other))),
        }
    }

    pub fn read_float(&mut self) -> Result<f32> {
        let bytes = self.read_exact(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_double(&mut self) -> Result<f64> {
        let bytes = self.read_exact(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(buf))
    }

    /// Read a non-negative `long` length
    pub fn read_len(&mut self) -> Result<usize> {
        let n = self.read_long()?;
        usize::try_from(n).map_err(|_| CodecError::malformed(format!("negative length {}", n)))
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_len()?;
        self.read_exact(len)
    }

    /// Read a string; invalid UTF-8 is replaced rather than rejected
    pub fn read_string(&mut self) -> Result<String> {
        Ok(String::from_utf8_lossy(self.read_bytes()?).into_owned())
    }
}
