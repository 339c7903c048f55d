#![cfg(feature = "serde")]

use anyhow::Result;
use stemma::{
    Hierarchy, MARKER_CH_HIERARCHY, MarkerSpec, NodeId, SubscriptionId, TraversalDir,
    TypedObject, ValueView, snapshot_hierarchy, snapshot_object,
};

#[test]
fn hierarchy_view_mirrors_nodes_and_subscriptions() -> Result<()> {
    let mut h = Hierarchy::new();
    let (a, b) = (NodeId::from("A"), NodeId::from("B"));
    h.set_hierarchy(&a, &[], &[])?;
    h.set_hierarchy(&b, &[a], &[])?;
    h.add_marker(
        SubscriptionId::from_bytes([7; 16]),
        MARKER_CH_HIERARCHY,
        MarkerSpec {
            origin: a,
            dir: TraversalDir::DfsDescendants,
            fields: None,
            filter: None,
        },
    )?;

    let view = snapshot_hierarchy(&h);
    assert_eq!(view.nodes.len(), 2);
    assert_eq!(view.heads, vec!["A".to_string()]);

    let node_a = view
        .nodes
        .iter()
        .find(|n| n.id == "A")
        .expect("node A present");
    assert_eq!(node_a.children, vec!["B".to_string()]);
    assert_eq!(node_a.marker_count, 1);

    assert_eq!(view.subscriptions.len(), 1);
    let sub = &view.subscriptions[0];
    assert_eq!(sub.flags, MARKER_CH_HIERARCHY);
    assert_eq!(sub.markers[0].dir, "dfs_descendants");
    Ok(())
}

#[test]
fn object_view_mirrors_the_value_tree() -> Result<()> {
    let mut obj = TypedObject::new();
    obj.set_str("name", "x")?;
    obj.set_long("nested.count", 3)?;

    let ValueView::Object(keys) = snapshot_object(&obj) else {
        panic!("object view expected");
    };
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0].0, "name");
    assert!(matches!(keys[0].1, ValueView::String(ref s) if s == "x"));
    assert!(matches!(keys[1].1, ValueView::Object(_)));
    Ok(())
}
