//! Nested ordered key→typed-value store addressed by dotted paths.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::types::ObjectType;

mod snapshot;
pub use snapshot::{OBJECT_ENCODING_VERSION, load as snapshot_load, save as snapshot_save};

/// Maximum byte length of a dotted path, including every separator.
pub const OBJECT_KEY_MAX: usize = u16::MAX as usize;

/// Maximum number of immediate keys a single object can hold.
pub const OBJECT_SIZE_MAX: usize = usize::MAX;

/// A typed value held by an object key.
///
/// The storage variant always matches the reported [`ObjectType`]; switching
/// a key's type destroys the previous payload first.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ObjectValue {
    /// No payload.
    #[default]
    Null,
    /// Inline floating point value.
    Double(f64),
    /// Inline integer value.
    Long(i64),
    /// Owned string value.
    String(String),
    /// Nested object; this is what dotted paths traverse.
    Object(TypedObject),
    /// Ordered set of unique strings.
    Set(BTreeSet<String>),
    /// Ordered sequence whose elements share a single subtype.
    Array {
        /// Element kind. Only [`ObjectType::String`] elements are supported.
        subtype: ObjectType,
        /// Element storage.
        items: Vec<String>,
    },
}

impl ObjectValue {
    /// Returns the type tag matching the storage variant.
    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectValue::Null => ObjectType::Null,
            ObjectValue::Double(_) => ObjectType::Double,
            ObjectValue::Long(_) => ObjectType::Long,
            ObjectValue::String(_) => ObjectType::String,
            ObjectValue::Object(_) => ObjectType::Object,
            ObjectValue::Set(_) => ObjectType::Set,
            ObjectValue::Array { .. } => ObjectType::Array,
        }
    }
}

/// Ordered nested mapping from dotted-path keys to typed values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedObject {
    keys: BTreeMap<String, ObjectValue>,
}

impl TypedObject {
    /// Creates an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of immediate keys.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Iterates immediate keys in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ObjectValue)> {
        self.keys.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Destroys the key at `path`.
    pub fn del(&mut self, path: &str) -> Result<()> {
        check_path(path)?;
        let (container, leaf) = self.resolve_container_mut(path)?;
        container
            .keys
            .remove(leaf)
            .map(|_| ())
            .ok_or(Error::NotFound)
    }

    /// Succeeds when a key exists at `path`.
    pub fn exists(&self, path: &str) -> Result<()> {
        self.get(path).map(|_| ())
    }

    /// Returns the value at `path`.
    pub fn get(&self, path: &str) -> Result<&ObjectValue> {
        check_path(path)?;
        let mut obj = self;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let value = obj.keys.get(segment).ok_or(Error::NotFound)?;
            if segments.peek().is_none() {
                return Ok(value);
            }
            match value {
                ObjectValue::Object(nested) => obj = nested,
                _ => return Err(Error::NotFound),
            }
        }
        Err(Error::NotFound)
    }

    /// Returns the double at `path`.
    pub fn get_double(&self, path: &str) -> Result<f64> {
        match self.get(path)? {
            ObjectValue::Double(v) => Ok(*v),
            _ => Err(Error::WrongType),
        }
    }

    /// Returns the integer at `path`.
    pub fn get_long(&self, path: &str) -> Result<i64> {
        match self.get(path)? {
            ObjectValue::Long(v) => Ok(*v),
            _ => Err(Error::WrongType),
        }
    }

    /// Returns the string at `path`.
    pub fn get_str(&self, path: &str) -> Result<&str> {
        match self.get(path)? {
            ObjectValue::String(v) => Ok(v),
            _ => Err(Error::WrongType),
        }
    }

    /// Stores a double at `path`, overwriting any prior value.
    pub fn set_double(&mut self, path: &str, value: f64) -> Result<()> {
        self.set_value(path, ObjectValue::Double(value))
    }

    /// Stores an integer at `path`, overwriting any prior value.
    pub fn set_long(&mut self, path: &str, value: i64) -> Result<()> {
        self.set_value(path, ObjectValue::Long(value))
    }

    /// Stores a string at `path`, overwriting any prior value.
    pub fn set_str(&mut self, path: &str, value: impl Into<String>) -> Result<()> {
        self.set_value(path, ObjectValue::String(value.into()))
    }

    fn set_value(&mut self, path: &str, value: ObjectValue) -> Result<()> {
        check_path(path)?;
        *self.get_mut_create(path)? = value;
        Ok(())
    }

    /// Inserts `value` into the set at `path`, creating the set on a missing
    /// or null key.
    pub fn add_set(&mut self, path: &str, value: impl Into<String>) -> Result<()> {
        check_path(path)?;
        let slot = self.get_mut_create(path)?;
        if matches!(slot, ObjectValue::Null) {
            *slot = ObjectValue::Set(BTreeSet::new());
        }
        let ObjectValue::Set(set) = slot else {
            return Err(Error::WrongType);
        };

        if set.insert(value.into()) {
            Ok(())
        } else {
            Err(Error::Exists)
        }
    }

    /// Removes `value` from the set at `path`.
    pub fn rem_set(&mut self, path: &str, value: &str) -> Result<()> {
        check_path(path)?;
        let (container, leaf) = self.resolve_container_mut(path)?;
        match container.keys.get_mut(leaf) {
            Some(ObjectValue::Set(set)) => {
                if set.remove(value) {
                    Ok(())
                } else {
                    Err(Error::NotFound)
                }
            }
            Some(_) => Err(Error::Invalid),
            None => Err(Error::NotFound),
        }
    }

    /// Returns the set at `path`, if any.
    pub fn get_set(&self, path: &str) -> Option<&BTreeSet<String>> {
        match self.get(path) {
            Ok(ObjectValue::Set(set)) => Some(set),
            _ => None,
        }
    }

    /// Appends `value` to the array at `path`.
    ///
    /// A missing key, or an existing array of a different subtype, is
    /// replaced by a fresh array of `subtype`. Only string arrays are
    /// supported.
    pub fn add_array(
        &mut self,
        path: &str,
        subtype: ObjectType,
        value: impl Into<String>,
    ) -> Result<()> {
        if subtype != ObjectType::String {
            return Err(Error::WrongType);
        }

        check_path(path)?;
        let slot = self.get_mut_create(path)?;
        match slot {
            ObjectValue::Array {
                subtype: existing,
                items,
            } if *existing == subtype => items.push(value.into()),
            _ => {
                *slot = ObjectValue::Array {
                    subtype,
                    items: vec![value.into()],
                };
            }
        }
        Ok(())
    }

    /// Returns the type tag at `path`, or [`ObjectType::Null`] when missing.
    pub fn get_type(&self, path: &str) -> ObjectType {
        self.get(path)
            .map(|value| value.object_type())
            .unwrap_or(ObjectType::Null)
    }

    /// Returns the length of the value at `path`.
    ///
    /// Without a path this is the immediate key count. For a string it is
    /// the byte length, for sets, arrays and objects the element count,
    /// for scalars 1 and for null 0.
    pub fn len(&self, path: Option<&str>) -> Result<usize> {
        let Some(path) = path else {
            return Ok(self.key_count());
        };

        Ok(match self.get(path)? {
            ObjectValue::Null => 0,
            ObjectValue::Double(_) | ObjectValue::Long(_) => 1,
            ObjectValue::String(s) => s.len(),
            ObjectValue::Object(obj) => obj.key_count(),
            ObjectValue::Set(set) => set.len(),
            ObjectValue::Array { items, .. } => items.len(),
        })
    }

    /// Resolves `path`, creating intermediate objects and the final key.
    ///
    /// A missing or non-object intermediate is destructively replaced by a
    /// fresh empty object; a missing final key is created with a null value.
    fn get_mut_create(&mut self, path: &str) -> Result<&mut ObjectValue> {
        let mut obj = self;
        let mut segments = path.split('.').peekable();
        loop {
            let segment = segments.next().expect("split yields at least one segment");
            let last = segments.peek().is_none();

            if !obj.keys.contains_key(segment) && obj.keys.len() == OBJECT_SIZE_MAX {
                return Err(Error::ObjectTooBig);
            }

            let slot = obj.keys.entry(segment.to_string()).or_default();
            if last {
                return Ok(slot);
            }

            if !matches!(slot, ObjectValue::Object(_)) {
                *slot = ObjectValue::Object(TypedObject::new());
            }
            obj = match slot {
                ObjectValue::Object(nested) => nested,
                _ => unreachable!(),
            };
        }
    }

    /// Resolves the object containing the final path segment, read-only on
    /// the intermediate levels.
    fn resolve_container_mut<'a, 'p>(
        &'a mut self,
        path: &'p str,
    ) -> Result<(&'a mut TypedObject, &'p str)> {
        let (prefix, leaf) = match path.rsplit_once('.') {
            Some((prefix, leaf)) => (Some(prefix), leaf),
            None => (None, path),
        };

        let mut obj = self;
        if let Some(prefix) = prefix {
            for segment in prefix.split('.') {
                obj = match obj.keys.get_mut(segment) {
                    Some(ObjectValue::Object(nested)) => nested,
                    Some(_) => return Err(Error::NotFound),
                    None => return Err(Error::NotFound),
                };
            }
        }

        Ok((obj, leaf))
    }

    /// Inserts a value under a literal key name, bypassing path resolution.
    pub(crate) fn insert_raw(&mut self, name: String, value: ObjectValue) {
        self.keys.insert(name, value);
    }
}

fn check_path(path: &str) -> Result<()> {
    if path.len() > OBJECT_KEY_MAX {
        return Err(Error::NameTooLong);
    }
    Ok(())
}
