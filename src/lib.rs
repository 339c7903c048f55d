#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Encoding helpers shared by the snapshot formats.
pub mod encoding;
/// Shared error and result types, plus the reply message table.
pub mod error;
/// Event payload codec and the fire-and-forget publication queue.
pub mod events;
/// The DAG of nodes, traversal engine and orphan-head tracking.
pub mod hierarchy;
/// Embedding façade: keyspace, reply kinds and command dispatch.
pub mod host;
/// Binary operand structs for the `modify` command.
pub mod modify;
/// Nested ordered key→typed-value store addressed by dotted paths.
pub mod object;
/// Postfix filter compiler and stack-machine evaluator.
pub mod rpn;
/// Subscription markers over hierarchy traversal regions.
pub mod subscriptions;
/// Ordered container with an optional comparator.
pub mod svector;
/// Identifiers and wire tag enumerations.
pub mod types;

#[cfg(feature = "serde")]
pub mod serde_support;

pub use error::{Error, Result, reply_message};
pub use events::{DEFAULT_EVENT_QUEUE_DEPTH, EventPayload, EventQueue};
pub use hierarchy::{ChangeKind, ChangeRecord, Hierarchy, NodeMetadata};
pub use host::{DB_ENCODING_VERSION, Db, HIERARCHY_DEFAULT_KEY, Reply};
pub use modify::{OpIncrement, OpSet};
pub use object::{OBJECT_KEY_MAX, ObjectValue, TypedObject};
pub use rpn::{CompiledExpr, FieldSource, NoFields, RpnCtx, RpnError};
#[cfg(feature = "serde")]
pub use serde_support::{
    HierarchyView, MarkerView, NodeView, SubscriptionView, ValueView, snapshot_hierarchy,
    snapshot_object,
};
pub use subscriptions::{
    FilterSpec, MARKER_CH_FIELD, MARKER_CH_HIERARCHY, MarkerId, MarkerSpec,
};
pub use svector::SVector;
pub use types::*;
