//! Binary operand structs for the `modify` command.
//!
//! `op-increment` and `op-set` values arrive as little-endian packed
//! structs. An op-set header is followed by three contiguous byte buffers
//! (add, delete, value); for reference fields each buffer is a sequence of
//! ten byte node ids, otherwise a sequence of NUL-terminated strings.

use crate::error::{Error, Result};
use crate::types::NODE_ID_SIZE;

/// Wire size of an [`OpIncrement`].
const OP_INCREMENT_SIZE: usize = 17;

/// Wire size of an [`OpSet`] header.
const OP_SET_HEADER_SIZE: usize = 13;

/// The `modify … 4 FIELD VALUE` operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpIncrement {
    /// Value stored when the field does not exist yet.
    pub default: i64,
    /// Amount added to the current value.
    pub increment: i64,
    /// When set, the result is also sent to the value index.
    pub index: bool,
}

impl OpIncrement {
    /// Parses the wire form: `default` and `increment` as little-endian
    /// 64-bit integers followed by an `index` flag byte.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() != OP_INCREMENT_SIZE {
            return Err(Error::Invalid);
        }
        let default = i64::from_le_bytes(raw[0..8].try_into().expect("slice length checked"));
        let increment = i64::from_le_bytes(raw[8..16].try_into().expect("slice length checked"));
        Ok(Self {
            default,
            increment,
            index: raw[16] != 0,
        })
    }

    /// Produces the wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(OP_INCREMENT_SIZE);
        out.extend_from_slice(&self.default.to_le_bytes());
        out.extend_from_slice(&self.increment.to_le_bytes());
        out.push(self.index as u8);
        out
    }
}

/// The `modify … 5 FIELD VALUE` operand.
///
/// `value` replaces the whole set; otherwise `add` and `delete` adjust it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpSet {
    /// When set, entries are ten byte node ids applied through the
    /// hierarchy instead of plain set members.
    pub is_reference: bool,
    /// Entries to add.
    pub add: Vec<Vec<u8>>,
    /// Entries to remove.
    pub delete: Vec<Vec<u8>>,
    /// Entries that replace the current set wholesale.
    pub value: Vec<Vec<u8>>,
}

impl OpSet {
    /// Parses the wire form: a `{is_reference: u8, add_len, delete_len,
    /// value_len: u32}` header followed by the three byte buffers.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.len() < OP_SET_HEADER_SIZE {
            return Err(Error::Invalid);
        }
        let is_reference = raw[0] != 0;
        let add_len = read_u32(&raw[1..5]) as usize;
        let delete_len = read_u32(&raw[5..9]) as usize;
        let value_len = read_u32(&raw[9..13]) as usize;

        let body = &raw[OP_SET_HEADER_SIZE..];
        let total = add_len
            .checked_add(delete_len)
            .and_then(|n| n.checked_add(value_len))
            .ok_or(Error::Invalid)?;
        if body.len() != total {
            return Err(Error::Invalid);
        }

        let (add, rest) = body.split_at(add_len);
        let (delete, value) = rest.split_at(delete_len);

        Ok(Self {
            is_reference,
            add: split_entries(add, is_reference)?,
            delete: split_entries(delete, is_reference)?,
            value: split_entries(value, is_reference)?,
        })
    }

    /// Produces the wire form.
    pub fn encode(&self) -> Vec<u8> {
        let add = join_entries(&self.add, self.is_reference);
        let delete = join_entries(&self.delete, self.is_reference);
        let value = join_entries(&self.value, self.is_reference);

        let mut out = Vec::with_capacity(OP_SET_HEADER_SIZE + add.len() + delete.len() + value.len());
        out.push(self.is_reference as u8);
        out.extend_from_slice(&(add.len() as u32).to_le_bytes());
        out.extend_from_slice(&(delete.len() as u32).to_le_bytes());
        out.extend_from_slice(&(value.len() as u32).to_le_bytes());
        out.extend_from_slice(&add);
        out.extend_from_slice(&delete);
        out.extend_from_slice(&value);
        out
    }
}

fn read_u32(raw: &[u8]) -> u32 {
    u32::from_le_bytes(raw.try_into().expect("slice length checked by caller"))
}

fn split_entries(buf: &[u8], is_reference: bool) -> Result<Vec<Vec<u8>>> {
    if is_reference {
        if buf.len() % NODE_ID_SIZE != 0 {
            return Err(Error::Invalid);
        }
        Ok(buf.chunks(NODE_ID_SIZE).map(<[u8]>::to_vec).collect())
    } else {
        let mut entries = Vec::new();
        let mut rest = buf;
        while !rest.is_empty() {
            let end = rest.iter().position(|&b| b == 0).ok_or(Error::Invalid)?;
            entries.push(rest[..end].to_vec());
            rest = &rest[end + 1..];
        }
        Ok(entries)
    }
}

fn join_entries(entries: &[Vec<u8>], is_reference: bool) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in entries {
        out.extend_from_slice(entry);
        if !is_reference {
            out.push(0);
        }
    }
    out
}
