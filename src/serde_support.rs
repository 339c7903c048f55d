//! Helper utilities for exporting hierarchies, subscriptions and typed
//! objects through `serde`.

use serde::Serialize;

use crate::hierarchy::Hierarchy;
use crate::object::{ObjectValue, TypedObject};

/// Serializable snapshot of a hierarchy and its subscriptions.
#[derive(Debug, Clone, Serialize)]
pub struct HierarchyView {
    /// Every node with its edge sets, in id order.
    pub nodes: Vec<NodeView>,
    /// Orphan heads, in id order.
    pub heads: Vec<String>,
    /// Registered subscriptions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscriptions: Vec<SubscriptionView>,
}

/// Serializable view of one node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    /// Printable node id.
    pub id: String,
    /// Parent ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    /// Child ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    /// Number of subscription markers attached to the node.
    pub marker_count: usize,
}

/// Serializable view of one subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    /// Hex wire form of the subscription id.
    pub id: String,
    /// OR of all marker flags.
    pub flags: u32,
    /// The subscription's markers.
    pub markers: Vec<MarkerView>,
}

/// Serializable view of one marker.
#[derive(Debug, Clone, Serialize)]
pub struct MarkerView {
    /// Marker flags.
    pub flags: u32,
    /// Printable origin node id.
    pub origin: String,
    /// Traversal direction name.
    pub dir: String,
    /// `\n`-separated field filter, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<String>,
    /// Filter expression source, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// Serializable mirror of a typed object value tree.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ValueView {
    /// Null value.
    Null(()),
    /// Double value.
    Double(f64),
    /// Integer value.
    Long(i64),
    /// String value.
    String(String),
    /// Nested object as name/value pairs in key order.
    Object(Vec<(String, ValueView)>),
    /// Set elements in order.
    Set(Vec<String>),
    /// Array elements in order.
    Array(Vec<String>),
}

/// Builds a serializable view of `hierarchy`.
pub fn snapshot_hierarchy(hierarchy: &Hierarchy) -> HierarchyView {
    let nodes = hierarchy
        .node_ids()
        .map(|id| NodeView {
            id: id.to_string(),
            parents: hierarchy
                .parents_of(id)
                .unwrap_or_default()
                .iter()
                .map(|p| p.to_string())
                .collect(),
            children: hierarchy
                .children_of(id)
                .unwrap_or_default()
                .iter()
                .map(|c| c.to_string())
                .collect(),
            marker_count: hierarchy
                .get_metadata(id)
                .map(|m| m.sub_markers.len())
                .unwrap_or(0),
        })
        .collect();

    let heads = hierarchy
        .get_heads()
        .into_iter()
        .map(|id| id.to_string())
        .collect();

    let subscriptions = hierarchy
        .subs
        .subs
        .iter()
        .map(|(id, sub)| SubscriptionView {
            id: id.to_string(),
            flags: sub.marker_flags,
            markers: sub
                .markers
                .iter()
                .filter_map(|marker| hierarchy.subs.markers.get(marker))
                .map(|marker| MarkerView {
                    flags: marker.flags,
                    origin: marker.origin.to_string(),
                    dir: marker.dir.name().to_string(),
                    fields: marker.fields.clone(),
                    expression: marker.filter.as_ref().map(|f| f.source.clone()),
                })
                .collect(),
        })
        .collect();

    HierarchyView {
        nodes,
        heads,
        subscriptions,
    }
}

/// Builds a serializable view of `obj`.
pub fn snapshot_object(obj: &TypedObject) -> ValueView {
    object_view(obj)
}

fn object_view(obj: &TypedObject) -> ValueView {
    ValueView::Object(
        obj.iter()
            .map(|(name, value)| (name.to_string(), value_view(value)))
            .collect(),
    )
}

fn value_view(value: &ObjectValue) -> ValueView {
    match value {
        ObjectValue::Null => ValueView::Null(()),
        ObjectValue::Double(v) => ValueView::Double(*v),
        ObjectValue::Long(v) => ValueView::Long(*v),
        ObjectValue::String(s) => ValueView::String(s.clone()),
        ObjectValue::Object(nested) => object_view(nested),
        ObjectValue::Set(set) => ValueView::Set(set.iter().cloned().collect()),
        ObjectValue::Array { items, .. } => ValueView::Array(items.clone()),
    }
}
