//! Snapshot field primitives built on the varint codec.
//!
//! Typed object, hierarchy and subscription snapshots all use the same
//! vocabulary: varints for counts and tags, zigzag varints for signed
//! integers, little-endian 8-byte doubles and length-prefixed strings.

use crate::encoding::varint::{decode_varint, encode_varint};
use crate::error::{Error, Result};

/// Appends an unsigned count or tag.
pub fn write_varint(value: u64, out: &mut Vec<u8>) {
    encode_varint(value, out);
}

/// Appends a signed integer using zigzag + varint encoding.
pub fn write_svarint(value: i64, out: &mut Vec<u8>) {
    let zigzag = ((value << 1) ^ (value >> 63)) as u64;
    encode_varint(zigzag, out);
}

/// Appends a little-endian IEEE-754 double.
pub fn write_f64(value: f64, out: &mut Vec<u8>) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Appends a length-prefixed string.
pub fn write_string(value: &str, out: &mut Vec<u8>) {
    encode_varint(value.len() as u64, out);
    out.extend_from_slice(value.as_bytes());
}

/// Cursor over an encoded snapshot payload.
pub struct SnapshotReader<'a> {
    input: &'a [u8],
}

impl<'a> SnapshotReader<'a> {
    /// Wraps a payload slice.
    pub fn new(input: &'a [u8]) -> Self {
        Self { input }
    }

    /// Returns `true` once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    /// Reads an unsigned count or tag.
    pub fn read_varint(&mut self) -> Result<u64> {
        decode_varint(&mut self.input)
    }

    /// Reads a zigzag-encoded signed integer.
    pub fn read_svarint(&mut self) -> Result<i64> {
        let raw = self.read_varint()?;
        let magnitude = (raw >> 1) as i64;
        let sign = (raw & 1) as i64;
        Ok(magnitude ^ -sign)
    }

    /// Reads a little-endian IEEE-754 double.
    pub fn read_f64(&mut self) -> Result<f64> {
        let bytes: [u8; 8] = self
            .take(8)?
            .try_into()
            .map_err(|_| Error::corrupt("double field truncated"))?;
        Ok(f64::from_le_bytes(bytes))
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_varint()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::corrupt("string field is not valid UTF-8"))
    }

    /// Reads exactly `len` raw bytes.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.input.len() < len {
            return Err(Error::corrupt("unexpected end of snapshot payload"));
        }
        let (head, rest) = self.input.split_at(len);
        self.input = rest;
        Ok(head)
    }
}
