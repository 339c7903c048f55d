//! Hierarchy snapshot I/O.
//!
//! Layout: `varint node_count`, then per node its ten byte id, a varint
//! child count and the child ids; parent edges are rebuilt from the child
//! lists. Subscriptions follow: `varint subscription_count`, then per
//! subscription its sixteen byte id and its markers (flags, origin,
//! direction tag, optional field list, optional filter source with its
//! register arguments). Loading re-attaches every marker.

use crate::encoding::{SnapshotReader, write_string, write_varint};
use crate::error::{Error, Result};
use crate::hierarchy::Hierarchy;
use crate::subscriptions::{FilterSpec, Marker, MarkerSpec};
use crate::types::{
    NODE_ID_SIZE, NodeId, SUBSCRIPTION_ID_SIZE, SubscriptionId, TraversalDir,
};

/// Current hierarchy encoding version.
pub const HIERARCHY_ENCODING_VERSION: u32 = 0;

/// Serializes `hierarchy`, including its subscriptions, into `out`.
pub fn save(hierarchy: &Hierarchy, out: &mut Vec<u8>) {
    write_varint(hierarchy.node_count() as u64, out);
    for id in hierarchy.node_ids() {
        out.extend_from_slice(id.as_bytes());
        let children = hierarchy.children_of(id).unwrap_or_default();
        write_varint(children.len() as u64, out);
        for child in children {
            out.extend_from_slice(child.as_bytes());
        }
    }

    write_varint(hierarchy.subs.subs.len() as u64, out);
    for (sub_id, sub) in &hierarchy.subs.subs {
        out.extend_from_slice(sub_id.as_bytes());

        let markers: Vec<&Marker> = sub
            .markers
            .iter()
            .filter_map(|marker| hierarchy.subs.markers.get(marker))
            .collect();
        write_varint(markers.len() as u64, out);

        for marker in markers {
            write_varint(marker.flags as u64, out);
            out.extend_from_slice(marker.origin.as_bytes());
            out.push(marker.dir.into());

            match &marker.fields {
                Some(fields) => {
                    out.push(1);
                    write_string(fields, out);
                }
                None => out.push(0),
            }

            match &marker.filter {
                Some(filter) => {
                    out.push(1);
                    write_string(&filter.source, out);
                    write_varint(filter.args.len() as u64, out);
                    for arg in &filter.args {
                        write_string(arg, out);
                    }
                }
                None => out.push(0),
            }
        }
    }
}

/// Deserializes a hierarchy previously written by [`save`].
pub fn load(reader: &mut SnapshotReader<'_>, encver: u32) -> Result<Hierarchy> {
    if encver != HIERARCHY_ENCODING_VERSION {
        return Err(Error::VersionMismatch);
    }

    let mut hierarchy = Hierarchy::new();

    let node_count = reader.read_varint()?;
    let mut edges: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
    for _ in 0..node_count {
        let id = NodeId::from_exact(reader.take(NODE_ID_SIZE)?)?;
        hierarchy.insert_node_raw(&id);

        let child_count = reader.read_varint()?;
        let mut children = Vec::with_capacity(child_count as usize);
        for _ in 0..child_count {
            children.push(NodeId::from_exact(reader.take(NODE_ID_SIZE)?)?);
        }
        edges.push((id, children));
    }

    for (id, children) in edges {
        for child in children {
            hierarchy.insert_node_raw(&child);
            hierarchy
                .add_edge(&id, &child)
                .map_err(|_| Error::corrupt("hierarchy snapshot contains an invalid edge"))?;
        }
    }

    let sub_count = reader.read_varint()?;
    for _ in 0..sub_count {
        let raw: [u8; SUBSCRIPTION_ID_SIZE] = reader
            .take(SUBSCRIPTION_ID_SIZE)?
            .try_into()
            .map_err(|_| Error::corrupt("subscription id truncated"))?;
        let sub_id = SubscriptionId::from_bytes(raw);

        let marker_count = reader.read_varint()?;
        for _ in 0..marker_count {
            let flags = u32::try_from(reader.read_varint()?)
                .map_err(|_| Error::corrupt("marker flags out of range"))?;
            let origin = NodeId::from_exact(reader.take(NODE_ID_SIZE)?)?;
            let dir = TraversalDir::try_from(reader.take(1)?[0])
                .map_err(|_| Error::corrupt("unknown traversal direction tag"))?;

            let fields = match reader.take(1)?[0] {
                0 => None,
                _ => Some(reader.read_string()?),
            };

            let filter = match reader.take(1)?[0] {
                0 => None,
                _ => {
                    let expression = reader.read_string()?;
                    let arg_count = reader.read_varint()?;
                    let mut args = Vec::with_capacity(arg_count as usize);
                    for _ in 0..arg_count {
                        args.push(reader.read_string()?);
                    }
                    Some(FilterSpec { expression, args })
                }
            };

            hierarchy.add_marker(
                sub_id,
                flags,
                MarkerSpec {
                    origin,
                    dir,
                    fields,
                    filter,
                },
            )?;
        }
    }

    hierarchy.take_changes();
    Ok(hierarchy)
}
