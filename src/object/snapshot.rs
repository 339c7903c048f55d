//! Typed object snapshot I/O.
//!
//! Layout: `varint key_count`, then per key a length-prefixed name, a
//! varint type tag and a type-specific payload. Null keys are not
//! persisted. Objects recurse, sets write an element count followed by the
//! elements. Arrays have no payload format yet: the saver records the tag
//! only and the loader skips the key with a warning, so array keys
//! round-trip to absent.

use std::collections::BTreeSet;

use tracing::warn;

use crate::encoding::{SnapshotReader, write_f64, write_string, write_svarint, write_varint};
use crate::error::{Error, Result};
use crate::object::{ObjectValue, TypedObject};
use crate::types::ObjectType;

/// Current typed object encoding version.
pub const OBJECT_ENCODING_VERSION: u32 = 0;

/// Serializes `obj` into `out`.
pub fn save(obj: &TypedObject, out: &mut Vec<u8>) {
    let persisted = obj
        .iter()
        .filter(|(_, value)| value.object_type() != ObjectType::Null)
        .count();
    write_varint(persisted as u64, out);

    for (name, value) in obj.iter() {
        let tag = value.object_type();
        if tag == ObjectType::Null {
            continue;
        }

        write_string(name, out);
        write_varint(u8::from(tag) as u64, out);

        match value {
            ObjectValue::Null => {}
            ObjectValue::Double(v) => write_f64(*v, out),
            ObjectValue::Long(v) => write_svarint(*v, out),
            ObjectValue::String(v) => write_string(v, out),
            ObjectValue::Object(nested) => save(nested, out),
            ObjectValue::Set(set) => {
                write_varint(set.len() as u64, out);
                for element in set {
                    write_string(element, out);
                }
            }
            ObjectValue::Array { .. } => {
                warn!(key = name, "array keys are not persisted yet");
            }
        }
    }
}

/// Deserializes an object previously written by [`save`].
pub fn load(reader: &mut SnapshotReader<'_>, encver: u32) -> Result<TypedObject> {
    if encver != OBJECT_ENCODING_VERSION {
        return Err(Error::VersionMismatch);
    }

    let mut obj = TypedObject::new();
    let key_count = reader.read_varint()?;

    for _ in 0..key_count {
        let name = reader.read_string()?;
        let tag = reader.read_varint()?;
        let tag = u8::try_from(tag)
            .ok()
            .and_then(|raw| ObjectType::try_from(raw).ok())
            .ok_or_else(|| Error::corrupt(format!("unknown object type tag {tag}")))?;

        match tag {
            ObjectType::Null => {
                warn!(key = %name, "null keys should not exist in a snapshot");
            }
            ObjectType::Double => {
                let value = reader.read_f64()?;
                obj.insert_raw(name, ObjectValue::Double(value));
            }
            ObjectType::Long => {
                let value = reader.read_svarint()?;
                obj.insert_raw(name, ObjectValue::Long(value));
            }
            ObjectType::String => {
                let value = reader.read_string()?;
                obj.insert_raw(name, ObjectValue::String(value));
            }
            ObjectType::Object => {
                let nested = load(reader, encver)?;
                obj.insert_raw(name, ObjectValue::Object(nested));
            }
            ObjectType::Set => {
                let element_count = reader.read_varint()?;
                let mut set = BTreeSet::new();
                for _ in 0..element_count {
                    set.insert(reader.read_string()?);
                }
                obj.insert_raw(name, ObjectValue::Set(set));
            }
            ObjectType::Array => {
                warn!(key = %name, "array keys are not supported in snapshots; skipping");
            }
        }
    }

    Ok(obj)
}
