//! Subscription markers over hierarchy traversal regions.
//!
//! A subscription owns a set of markers. Each marker describes a traversal
//! from an origin node; a reference to the marker is kept in the metadata
//! of every node the traversal covers, so a mutation can find the markers
//! it affects by looking at the mutated node alone. Markers optionally
//! carry a field-name filter and a compiled postfix predicate evaluated
//! with register 0 bound to the mutated node's id.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::events::{EventPayload, EventQueue};
use crate::hierarchy::{ChangeKind, Hierarchy};
use crate::rpn::{self, CompiledExpr, FieldSource, RpnCtx};
use crate::svector::SVector;
use crate::types::{NodeId, SubscriptionId, TraversalDir};

/// Engine-local identifier of a single marker.
pub type MarkerId = u64;

/// Marker flag: interested in parent/child edge changes.
pub const MARKER_CH_HIERARCHY: u32 = 0x01;

/// Marker flag: interested in field value changes.
pub const MARKER_CH_FIELD: u32 = 0x02;

/// Filter half of a marker creation spec.
#[derive(Debug, Clone)]
pub struct FilterSpec {
    /// Postfix expression source.
    pub expression: String,
    /// Values for registers 1…N; register 0 is reserved for the node id.
    pub args: Vec<String>,
}

/// Everything needed to create a marker.
#[derive(Debug, Clone)]
pub struct MarkerSpec {
    /// Traversal origin.
    pub origin: NodeId,
    /// Traversal direction.
    pub dir: TraversalDir,
    /// Optional `\n`-separated field-name filter.
    pub fields: Option<String>,
    /// Optional predicate.
    pub filter: Option<FilterSpec>,
}

#[derive(Debug)]
pub(crate) struct MarkerFilter {
    pub(crate) source: String,
    pub(crate) args: Vec<String>,
    pub(crate) ctx: RpnCtx,
    pub(crate) expr: CompiledExpr,
}

#[derive(Debug)]
pub(crate) struct Marker {
    pub(crate) flags: u32,
    pub(crate) sub: SubscriptionId,
    pub(crate) origin: NodeId,
    pub(crate) dir: TraversalDir,
    pub(crate) fields: Option<String>,
    pub(crate) filter: Option<MarkerFilter>,
}

impl Marker {
    fn matches_field(&self, field: &str) -> bool {
        self.fields
            .as_deref()
            .is_some_and(|list| list.split('\n').any(|name| name == field))
    }
}

#[derive(Debug)]
pub(crate) struct Subscription {
    pub(crate) marker_flags: u32,
    pub(crate) markers: SVector<MarkerId>,
}

impl Subscription {
    fn new() -> Self {
        Self {
            marker_flags: 0,
            markers: SVector::sorted(1),
        }
    }
}

/// All subscriptions applying to one hierarchy.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionRegistry {
    pub(crate) subs: BTreeMap<SubscriptionId, Subscription>,
    pub(crate) markers: BTreeMap<MarkerId, Marker>,
    next_marker: MarkerId,
}

impl SubscriptionRegistry {
    fn alloc_marker_id(&mut self) -> MarkerId {
        self.next_marker += 1;
        self.next_marker
    }
}

impl Hierarchy {
    /// Creates a marker under `sub_id`, creating the subscription when it
    /// does not exist yet, and attaches it along its traversal.
    ///
    /// An existing (subscription, origin, direction) tuple is not replaced;
    /// a second marker is added.
    pub fn add_marker(
        &mut self,
        sub_id: SubscriptionId,
        flags: u32,
        spec: MarkerSpec,
    ) -> Result<MarkerId> {
        let filter = match spec.filter {
            Some(filter_spec) => {
                let expr =
                    rpn::compile(&filter_spec.expression).map_err(|_| Error::RpnCompile)?;
                let mut ctx = RpnCtx::new(filter_spec.args.len() + 2);
                for (i, arg) in filter_spec.args.iter().enumerate() {
                    ctx.set_reg(i + 1, arg.as_bytes())?;
                }
                Some(MarkerFilter {
                    source: filter_spec.expression,
                    args: filter_spec.args,
                    ctx,
                    expr,
                })
            }
            None => None,
        };

        let marker_id = self.subs.alloc_marker_id();
        let sub = self
            .subs
            .subs
            .entry(sub_id)
            .or_insert_with(Subscription::new);
        sub.marker_flags |= flags;
        sub.markers.insert(marker_id);
        self.subs.markers.insert(
            marker_id,
            Marker {
                flags,
                sub: sub_id,
                origin: spec.origin,
                dir: spec.dir,
                fields: spec.fields,
                filter,
            },
        );

        if let Err(err) = self.attach_marker(marker_id) {
            warn!(sub = %sub_id, %err, "could not fully apply a subscription marker");
        }
        Ok(marker_id)
    }

    /// Re-runs the attach traversal for every marker of a subscription.
    pub fn refresh_subscription(&mut self, sub_id: &SubscriptionId) -> Result<()> {
        let sub = self
            .subs
            .subs
            .get(sub_id)
            .ok_or(Error::SubscriptionsNotFound)?;
        let markers: Vec<MarkerId> = sub.markers.iter().copied().collect();

        let mut result = Ok(());
        for marker in markers {
            if let Err(err) = self.attach_marker(marker) {
                warn!(sub = %sub_id, %err, "could not fully refresh a subscription");
                result = Err(err);
            }
        }
        result
    }

    /// Destroys a subscription and every marker it owns.
    ///
    /// Returns `false` when no such subscription exists.
    pub fn delete_subscription(&mut self, sub_id: &SubscriptionId) -> bool {
        let Some(sub) = self.subs.subs.remove(sub_id) else {
            return false;
        };
        for marker in sub.markers.iter().copied().collect::<Vec<_>>() {
            self.clear_marker_coverage(marker);
            self.subs.markers.remove(&marker);
        }
        true
    }

    /// Returns `true` when a subscription with `sub_id` exists.
    pub fn subscription_exists(&self, sub_id: &SubscriptionId) -> bool {
        self.subs.subs.contains_key(sub_id)
    }

    /// Lists subscription ids in id order.
    pub fn subscription_ids(&self) -> Vec<SubscriptionId> {
        self.subs.subs.keys().copied().collect()
    }

    /// Returns the OR of all marker flags of a subscription.
    pub fn subscription_flags(&self, sub_id: &SubscriptionId) -> Option<u32> {
        self.subs.subs.get(sub_id).map(|sub| sub.marker_flags)
    }

    /// Returns a printable dump of every marker of a subscription.
    pub fn marker_dumps(&self, sub_id: &SubscriptionId) -> Result<Vec<String>> {
        let sub = self
            .subs
            .subs
            .get(sub_id)
            .ok_or(Error::SubscriptionsNotFound)?;

        Ok(sub
            .markers
            .iter()
            .filter_map(|marker| self.subs.markers.get(marker))
            .map(|marker| {
                format!(
                    "flags: {}\nnode_id: \"{}\"\ndir: {}\nexpression: {}\nfields: \"{}\"",
                    marker.flags,
                    marker.origin,
                    marker.dir.name(),
                    if marker.filter.is_some() { "set" } else { "unset" },
                    marker.fields.as_deref().unwrap_or(""),
                )
            })
            .collect())
    }

    /// Inserts the marker into the metadata of every node its traversal
    /// covers.
    pub(crate) fn attach_marker(&mut self, marker_id: MarkerId) -> Result<()> {
        let Some(marker) = self.subs.markers.get(&marker_id) else {
            return Ok(());
        };
        let (origin, dir) = (marker.origin, marker.dir);

        let covered = self.traverse_collect(&origin, dir)?;
        for node in covered {
            if let Some(metadata) = self.metadata_mut(&node) {
                metadata.sub_markers.insert(marker_id);
            }
        }
        Ok(())
    }

    /// Re-attaches a batch of markers after a structural mutation.
    ///
    /// A marker whose origin no longer exists is left detached.
    pub(crate) fn reattach_markers(&mut self, markers: &[MarkerId]) {
        for marker in markers {
            if let Err(err) = self.attach_marker(*marker) {
                debug!(marker = *marker, %err, "marker re-attach skipped");
            }
        }
    }

    /// Removes the marker from the metadata of every node its traversal
    /// covers.
    pub(crate) fn clear_marker_coverage(&mut self, marker_id: MarkerId) {
        let Some(marker) = self.subs.markers.get(&marker_id) else {
            return;
        };
        let (origin, dir) = (marker.origin, marker.dir);

        if let Ok(covered) = self.traverse_collect(&origin, dir) {
            for node in covered {
                if let Some(metadata) = self.metadata_mut(&node) {
                    metadata.sub_markers.remove(&marker_id);
                }
            }
        }
    }

    /// Returns the distinct markers present on any of the listed nodes.
    pub(crate) fn collect_markers_on(&self, ids: &[NodeId]) -> Vec<MarkerId> {
        let mut found = Vec::new();
        for id in ids {
            let Ok(metadata) = self.get_metadata(id) else {
                continue;
            };
            for marker in &metadata.sub_markers {
                if !found.contains(marker) {
                    found.push(*marker);
                }
            }
        }
        found
    }

    /// Node-deletion cleanup: clears every marker attached to the node and
    /// returns them so the caller can re-attach after the node is gone.
    pub(crate) fn clear_node_markers(&mut self, id: &NodeId) -> Vec<MarkerId> {
        let markers = self.collect_markers_on(std::slice::from_ref(id));
        for marker in &markers {
            self.clear_marker_coverage(*marker);
        }
        if let Some(metadata) = self.metadata_mut(id) {
            metadata.sub_markers.clear();
        }
        markers
    }

    /// Evaluates the queued change records against the markers on each
    /// mutated node and publishes an event for every marker that matches.
    pub fn drain_changes(&mut self, fields: &dyn FieldSource, queue: &EventQueue) {
        for record in self.take_changes() {
            let Ok(metadata) = self.get_metadata(&record.node) else {
                continue;
            };
            let marker_ids: Vec<MarkerId> = metadata.sub_markers.iter().copied().collect();

            for marker_id in marker_ids {
                let Some(marker) = self.subs.markers.get_mut(&marker_id) else {
                    continue;
                };

                let (interested, field) = match &record.kind {
                    ChangeKind::Hierarchy => (marker.flags & MARKER_CH_HIERARCHY != 0, None),
                    ChangeKind::Field(name) => (
                        marker.flags & MARKER_CH_FIELD != 0 && marker.matches_field(name),
                        Some(name.clone()),
                    ),
                };
                if !interested {
                    continue;
                }

                if let Some(filter) = marker.filter.as_mut() {
                    if filter.ctx.set_reg(0, record.node.as_bytes()).is_err() {
                        continue;
                    }
                    match filter.ctx.bool(fields, &filter.expr) {
                        Ok(true) => {}
                        Ok(false) => continue,
                        Err(err) => {
                            warn!(node = %record.node, %err, "marker filter evaluation failed");
                            continue;
                        }
                    }
                }

                let payload = EventPayload::Change {
                    sub: marker.sub,
                    node: record.node,
                    field,
                };
                queue.publish(payload.encode());
            }
        }
    }
}
