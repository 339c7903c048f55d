//! Fire-and-forget event publication.
//!
//! The engine only enqueues; the host drains the receiver on its own
//! schedule. Publishing never blocks: when the queue is full the payload is
//! dropped and logged, and the triggering mutation is unaffected.

use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};

use bytes::Bytes;
use tracing::warn;

use crate::encoding::{SnapshotReader, write_string, write_varint};
use crate::error::{Error, Result};
use crate::types::{NODE_ID_SIZE, NodeId, SUBSCRIPTION_ID_SIZE, SubscriptionId};

/// Default bound of the publication queue.
pub const DEFAULT_EVENT_QUEUE_DEPTH: usize = 1024;

const TAG_CHANGE: u64 = 0;
const TAG_INDEX: u64 = 1;

/// Bounded single-producer publication queue of opaque byte payloads.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: SyncSender<Bytes>,
}

impl EventQueue {
    /// Creates a queue bounded to `depth` pending payloads, returning the
    /// receiving end for the host to drain.
    pub fn bounded(depth: usize) -> (Self, Receiver<Bytes>) {
        let (tx, rx) = sync_channel(depth);
        (Self { tx }, rx)
    }

    /// Enqueues a payload, best effort.
    pub fn publish(&self, payload: Bytes) {
        match self.tx.try_send(payload) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("event queue full; dropping publish");
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("event queue receiver is gone; dropping publish");
            }
        }
    }
}

/// A decoded event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// A subscription marker fired for a node.
    Change {
        /// The owning subscription.
        sub: SubscriptionId,
        /// The mutated node.
        node: NodeId,
        /// The changed field, when the trigger was a field mutation.
        field: Option<String>,
    },
    /// An indexed value was written.
    Index {
        /// The mutated node.
        node: NodeId,
        /// The indexed field.
        field: String,
        /// The stored value.
        value: String,
    },
}

impl EventPayload {
    /// Serializes the payload into its wire form.
    pub fn encode(&self) -> Bytes {
        let mut out = Vec::new();
        match self {
            EventPayload::Change { sub, node, field } => {
                write_varint(TAG_CHANGE, &mut out);
                out.extend_from_slice(sub.as_bytes());
                out.extend_from_slice(node.as_bytes());
                match field {
                    Some(field) => {
                        out.push(1);
                        write_string(field, &mut out);
                    }
                    None => out.push(0),
                }
            }
            EventPayload::Index { node, field, value } => {
                write_varint(TAG_INDEX, &mut out);
                out.extend_from_slice(node.as_bytes());
                write_string(field, &mut out);
                write_string(value, &mut out);
            }
        }
        Bytes::from(out)
    }

    /// Parses a wire-form payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = SnapshotReader::new(bytes);
        let tag = reader.read_varint()?;
        match tag {
            TAG_CHANGE => {
                let sub = reader.take(SUBSCRIPTION_ID_SIZE)?;
                let sub = SubscriptionId::from_bytes(
                    sub.try_into().expect("length checked by take"),
                );
                let node = NodeId::from_exact(reader.take(NODE_ID_SIZE)?)?;
                let field = match reader.take(1)?[0] {
                    0 => None,
                    _ => Some(reader.read_string()?),
                };
                Ok(EventPayload::Change { sub, node, field })
            }
            TAG_INDEX => {
                let node = NodeId::from_exact(reader.take(NODE_ID_SIZE)?)?;
                let field = reader.read_string()?;
                let value = reader.read_string()?;
                Ok(EventPayload::Index { node, field, value })
            }
            _ => Err(Error::corrupt(format!("unknown event payload tag {tag}"))),
        }
    }
}
