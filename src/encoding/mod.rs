//! Encoding helpers shared by every snapshot format in the crate.

mod snapshot;
mod varint;

pub use snapshot::{SnapshotReader, write_f64, write_string, write_svarint, write_varint};
pub use varint::{VARINT_MAX_LEN, decode_varint, encode_varint};
