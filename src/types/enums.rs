#![allow(missing_docs)]

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Value kinds a typed object key can hold.
///
/// The discriminants are also the snapshot wire tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ObjectType {
    #[default]
    Null = 0,
    Double = 1,
    Long = 2,
    String = 3,
    Object = 4,
    Set = 5,
    Array = 6,
}

impl ObjectType {
    /// Returns the type name used by the `object.type` reply.
    pub fn name(self) -> &'static str {
        match self {
            ObjectType::Null => "null",
            ObjectType::Double => "double",
            ObjectType::Long => "long",
            ObjectType::String => "string",
            ObjectType::Object => "object",
            ObjectType::Set => "set",
            ObjectType::Array => "array",
        }
    }
}

/// Hierarchy traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum TraversalDir {
    /// Visit the origin node only.
    Node = 1,
    BfsAncestors = 2,
    BfsDescendants = 3,
    DfsAncestors = 4,
    DfsDescendants = 5,
    /// Visit every node reachable from the orphan heads.
    DfsFull = 6,
}

impl TraversalDir {
    /// Returns the printable direction name used by marker dumps.
    pub fn name(self) -> &'static str {
        match self {
            TraversalDir::Node => "node",
            TraversalDir::BfsAncestors => "bfs_ancestors",
            TraversalDir::BfsDescendants => "bfs_descendants",
            TraversalDir::DfsAncestors => "dfs_ancestors",
            TraversalDir::DfsDescendants => "dfs_descendants",
            TraversalDir::DfsFull => "dfs_full",
        }
    }
}

/// Value type tags accepted by the `modify` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ModifyArgType {
    Value = b'0',
    IndexedValue = b'1',
    Default = b'2',
    DefaultIndexed = b'3',
    OpIncrement = b'4',
    OpSet = b'5',
}
