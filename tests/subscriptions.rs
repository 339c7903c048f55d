use std::collections::HashMap;

use anyhow::Result;
use stemma::rpn::FieldSource;
use stemma::{
    EventPayload, EventQueue, FilterSpec, Hierarchy, MARKER_CH_FIELD, MARKER_CH_HIERARCHY,
    MarkerSpec, NodeId, SubscriptionId, TraversalDir,
};

fn id(name: &str) -> NodeId {
    NodeId::from(name)
}

fn sub(hex_seed: u8) -> SubscriptionId {
    SubscriptionId::from_bytes([hex_seed; 16])
}

struct NoFields;

impl FieldSource for NoFields {
    fn field(&self, _node: &NodeId, _field: &str) -> Option<String> {
        None
    }
}

struct MapFields(HashMap<String, String>);

impl FieldSource for MapFields {
    fn field(&self, _node: &NodeId, field: &str) -> Option<String> {
        self.0.get(field).cloned()
    }
}

fn chain() -> Result<Hierarchy> {
    let mut h = Hierarchy::new();
    h.set_hierarchy(&id("A"), &[], &[])?;
    h.set_hierarchy(&id("B"), &[id("A")], &[])?;
    h.set_hierarchy(&id("C"), &[id("B")], &[])?;
    h.take_changes();
    Ok(h)
}

fn descendants_marker(origin: &str) -> MarkerSpec {
    MarkerSpec {
        origin: id(origin),
        dir: TraversalDir::DfsDescendants,
        fields: None,
        filter: None,
    }
}

fn marker_count(h: &Hierarchy, node: &str) -> usize {
    h.get_metadata(&id(node))
        .map(|m| m.sub_markers.len())
        .unwrap_or(0)
}

#[test]
fn markers_attach_over_the_traversal_region() -> Result<()> {
    let mut h = chain()?;
    h.set_hierarchy(&id("Z"), &[], &[])?;
    h.take_changes();

    h.add_marker(sub(1), MARKER_CH_HIERARCHY, descendants_marker("A"))?;

    for node in ["A", "B", "C"] {
        assert_eq!(marker_count(&h, node), 1, "marker missing on {node}");
    }
    assert_eq!(marker_count(&h, "Z"), 0);

    assert_eq!(h.subscription_ids(), vec![sub(1)]);
    assert_eq!(h.subscription_flags(&sub(1)), Some(MARKER_CH_HIERARCHY));
    Ok(())
}

#[test]
fn new_descendant_fires_the_marker() -> Result<()> {
    let mut h = chain()?;
    h.add_marker(sub(1), MARKER_CH_HIERARCHY, descendants_marker("A"))?;

    h.add_hierarchy(&id("D"), &[id("C")], &[])?;

    // The marker followed the hierarchy change down to the new node.
    assert_eq!(marker_count(&h, "D"), 1);

    let (queue, rx) = EventQueue::bounded(16);
    h.drain_changes(&NoFields, &queue);

    let events: Vec<EventPayload> = rx
        .try_iter()
        .map(|payload| EventPayload::decode(&payload))
        .collect::<Result<_, _>>()?;
    assert!(
        events.contains(&EventPayload::Change {
            sub: sub(1),
            node: id("D"),
            field: None,
        }),
        "expected a hierarchy change event for D, got {events:?}"
    );
    Ok(())
}

#[test]
fn edge_removal_shrinks_the_coverage() -> Result<()> {
    let mut h = chain()?;
    h.add_marker(sub(1), MARKER_CH_HIERARCHY, descendants_marker("A"))?;

    h.del_hierarchy(&id("B"), &[id("A")], &[])?;

    assert_eq!(marker_count(&h, "A"), 1);
    assert_eq!(marker_count(&h, "B"), 0);
    assert_eq!(marker_count(&h, "C"), 0);
    Ok(())
}

#[test]
fn node_deletion_clears_markers() -> Result<()> {
    let mut h = chain()?;
    h.add_marker(sub(1), MARKER_CH_HIERARCHY, descendants_marker("A"))?;
    h.add_hierarchy(&id("D"), &[id("C")], &[])?;

    h.del_node(&id("C"))?;

    assert_eq!(marker_count(&h, "A"), 1);
    assert_eq!(marker_count(&h, "B"), 1);
    // D is no longer reachable from the marker origin.
    assert_eq!(marker_count(&h, "D"), 0);
    Ok(())
}

#[test]
fn delete_subscription_removes_every_marker() -> Result<()> {
    let mut h = chain()?;
    h.add_marker(sub(1), MARKER_CH_HIERARCHY, descendants_marker("A"))?;
    h.add_marker(sub(1), MARKER_CH_HIERARCHY, descendants_marker("B"))?;

    assert!(h.delete_subscription(&sub(1)));
    assert!(!h.delete_subscription(&sub(1)));

    for node in ["A", "B", "C"] {
        assert_eq!(marker_count(&h, node), 0, "marker left behind on {node}");
    }
    assert!(h.subscription_ids().is_empty());
    Ok(())
}

#[test]
fn duplicate_marker_tuples_accumulate() -> Result<()> {
    let mut h = chain()?;
    h.add_marker(sub(1), MARKER_CH_HIERARCHY, descendants_marker("A"))?;
    h.add_marker(sub(1), MARKER_CH_HIERARCHY, descendants_marker("A"))?;

    assert_eq!(marker_count(&h, "B"), 2);
    assert_eq!(h.marker_dumps(&sub(1))?.len(), 2);
    Ok(())
}

#[test]
fn node_marker_covers_only_its_origin() -> Result<()> {
    let mut h = chain()?;
    h.add_marker(
        sub(2),
        MARKER_CH_HIERARCHY,
        MarkerSpec {
            origin: id("B"),
            dir: TraversalDir::Node,
            fields: None,
            filter: None,
        },
    )?;

    assert_eq!(marker_count(&h, "A"), 0);
    assert_eq!(marker_count(&h, "B"), 1);
    assert_eq!(marker_count(&h, "C"), 0);
    Ok(())
}

#[test]
fn field_filter_gates_field_events() -> Result<()> {
    let mut h = chain()?;
    h.add_marker(
        sub(3),
        MARKER_CH_HIERARCHY | MARKER_CH_FIELD,
        MarkerSpec {
            origin: id("A"),
            dir: TraversalDir::DfsDescendants,
            fields: Some("status\ntitle".to_string()),
            filter: None,
        },
    )?;

    h.record_field_change(id("B"), "status");
    h.record_field_change(id("B"), "other");

    let (queue, rx) = EventQueue::bounded(16);
    h.drain_changes(&NoFields, &queue);

    let events: Vec<EventPayload> = rx
        .try_iter()
        .map(|payload| EventPayload::decode(&payload))
        .collect::<Result<_, _>>()?;
    assert_eq!(
        events,
        vec![EventPayload::Change {
            sub: sub(3),
            node: id("B"),
            field: Some("status".to_string()),
        }]
    );
    Ok(())
}

#[test]
fn predicate_gates_events_on_live_field_values() -> Result<()> {
    let mut h = chain()?;
    h.add_marker(
        sub(4),
        MARKER_CH_HIERARCHY | MARKER_CH_FIELD,
        MarkerSpec {
            origin: id("A"),
            dir: TraversalDir::DfsDescendants,
            fields: Some("status".to_string()),
            filter: Some(FilterSpec {
                expression: "$1 f \"ready c".to_string(),
                args: vec!["status".to_string()],
            }),
        },
    )?;

    let (queue, rx) = EventQueue::bounded(16);

    h.record_field_change(id("B"), "status");
    let ready = MapFields(HashMap::from([("status".to_string(), "ready".to_string())]));
    h.drain_changes(&ready, &queue);
    assert_eq!(rx.try_iter().count(), 1);

    h.record_field_change(id("B"), "status");
    let pending = MapFields(HashMap::from([(
        "status".to_string(),
        "pending".to_string(),
    )]));
    h.drain_changes(&pending, &queue);
    assert_eq!(rx.try_iter().count(), 0);
    Ok(())
}

#[test]
fn refresh_reports_a_missing_origin() -> Result<()> {
    let mut h = chain()?;
    h.add_marker(
        sub(5),
        MARKER_CH_HIERARCHY,
        MarkerSpec {
            origin: id("ghost"),
            dir: TraversalDir::DfsDescendants,
            fields: None,
            filter: None,
        },
    )?;

    assert!(h.refresh_subscription(&sub(5)).is_err());
    assert!(h.refresh_subscription(&sub(6)).is_err());
    Ok(())
}

#[test]
fn marker_dumps_are_printable() -> Result<()> {
    let mut h = chain()?;
    h.add_marker(
        sub(7),
        MARKER_CH_HIERARCHY | MARKER_CH_FIELD,
        MarkerSpec {
            origin: id("A"),
            dir: TraversalDir::DfsDescendants,
            fields: Some("status".to_string()),
            filter: Some(FilterSpec {
                expression: "#1".to_string(),
                args: Vec::new(),
            }),
        },
    )?;

    let dumps = h.marker_dumps(&sub(7))?;
    assert_eq!(dumps.len(), 1);
    assert!(dumps[0].contains("dir: dfs_descendants"));
    assert!(dumps[0].contains("expression: set"));
    assert!(dumps[0].contains("fields: \"status\""));
    Ok(())
}

#[test]
fn full_queue_drops_events_without_corrupting_state() -> Result<()> {
    let mut h = chain()?;
    h.add_marker(sub(8), MARKER_CH_HIERARCHY, descendants_marker("A"))?;

    let (queue, rx) = EventQueue::bounded(1);
    h.add_hierarchy(&id("D"), &[id("C")], &[])?;
    h.add_hierarchy(&id("E"), &[id("C")], &[])?;
    h.drain_changes(&NoFields, &queue);

    // Only one event fits; the rest were dropped.
    assert_eq!(rx.try_iter().count(), 1);

    // The hierarchy and the marker coverage stayed intact.
    assert!(h.node_exists(&id("E")));
    assert_eq!(marker_count(&h, "E"), 1);
    let mut descendants = h.find_descendants(&id("A"))?;
    descendants.sort();
    assert_eq!(descendants, vec![id("B"), id("C"), id("D"), id("E")]);
    Ok(())
}
