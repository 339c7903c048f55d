use anyhow::Result;
use stemma::{Error, Hierarchy, NodeId, TraversalDir};

fn id(name: &str) -> NodeId {
    NodeId::from(name)
}

/// Edge symmetry and head bookkeeping, checked over the whole graph.
fn assert_consistent(h: &Hierarchy) {
    let ids: Vec<NodeId> = h.node_ids().copied().collect();
    for node in &ids {
        for parent in h.parents_of(node).expect("node exists") {
            assert!(
                h.children_of(parent)
                    .expect("parent exists")
                    .contains(node),
                "edge {parent} -> {node} missing on the parent side"
            );
        }
        for child in h.children_of(node).expect("node exists") {
            assert!(
                h.parents_of(child).expect("child exists").contains(node),
                "edge {node} -> {child} missing on the child side"
            );
        }
        let is_head = h.parents_of(node).expect("node exists").is_empty();
        assert_eq!(
            h.get_heads().contains(node),
            is_head,
            "head set does not match the parent set of {node}"
        );
    }
}

fn chain() -> Result<Hierarchy> {
    let mut h = Hierarchy::new();
    h.set_hierarchy(&id("A"), &[], &[])?;
    h.set_hierarchy(&id("B"), &[id("A")], &[])?;
    h.set_hierarchy(&id("C"), &[id("B")], &[])?;
    Ok(h)
}

#[test]
fn chain_heads_ancestors_descendants() -> Result<()> {
    let mut h = chain()?;

    assert_eq!(h.get_heads(), vec![id("A")]);

    let mut ancestors = h.find_ancestors(&id("C"))?;
    ancestors.sort();
    assert_eq!(ancestors, vec![id("A"), id("B")]);

    let mut descendants = h.find_descendants(&id("A"))?;
    descendants.sort();
    assert_eq!(descendants, vec![id("B"), id("C")]);

    assert_eq!(h.get_depth(&id("A"))?, 0);
    assert_eq!(h.get_depth(&id("C"))?, 2);

    assert_consistent(&h);
    Ok(())
}

#[test]
fn deleting_an_edge_promotes_a_head() -> Result<()> {
    let mut h = chain()?;
    h.del_hierarchy(&id("B"), &[id("A")], &[])?;

    assert_eq!(h.get_heads(), vec![id("A"), id("B")]);
    assert_eq!(h.find_ancestors(&id("C"))?, vec![id("B")]);
    assert_consistent(&h);
    Ok(())
}

#[test]
fn deleting_an_absent_edge_is_a_no_op() -> Result<()> {
    let mut h = chain()?;
    h.del_hierarchy(&id("C"), &[id("A")], &[])?;
    h.del_hierarchy(&id("A"), &[], &[id("A")])?;

    assert_eq!(h.get_heads(), vec![id("A")]);
    assert_consistent(&h);
    Ok(())
}

#[test]
fn cycles_are_refused() -> Result<()> {
    let mut h = chain()?;

    let err = h.add_hierarchy(&id("A"), &[id("C")], &[]).unwrap_err();
    assert_eq!(err, Error::HierarchyInvalid);

    let err = h.add_hierarchy(&id("A"), &[id("A")], &[]).unwrap_err();
    assert_eq!(err, Error::HierarchyInvalid);

    // The refused edges must not leave partial wiring behind.
    assert!(h.parents_of(&id("A"))?.is_empty());
    assert_consistent(&h);
    Ok(())
}

#[test]
fn a_failed_set_destroys_the_fresh_node() -> Result<()> {
    let mut h = chain()?;

    // D would become both an ancestor and a descendant of itself.
    let err = h
        .set_hierarchy(&id("D"), &[id("D")], &[])
        .unwrap_err();
    assert_eq!(err, Error::HierarchyInvalid);
    assert!(!h.node_exists(&id("D")));
    assert_consistent(&h);
    Ok(())
}

#[test]
fn add_hierarchy_is_idempotent() -> Result<()> {
    let mut h = Hierarchy::new();
    h.add_hierarchy(&id("A"), &[], &[id("B"), id("C")])?;
    h.add_hierarchy(&id("A"), &[], &[id("B"), id("C")])?;

    assert_eq!(h.children_of(&id("A"))?, &[id("B"), id("C")]);
    assert_eq!(h.parents_of(&id("B"))?, &[id("A")]);
    assert_consistent(&h);
    Ok(())
}

#[test]
fn set_hierarchy_replaces_both_edge_sets() -> Result<()> {
    let mut h = Hierarchy::new();
    h.add_hierarchy(&id("A"), &[], &[id("B"), id("C")])?;
    h.set_hierarchy(&id("A"), &[], &[id("C")])?;
    h.set_hierarchy(&id("A"), &[], &[id("C")])?;

    assert_eq!(h.children_of(&id("A"))?, &[id("C")]);
    assert!(h.parents_of(&id("B"))?.is_empty());
    assert!(h.get_heads().contains(&id("B")));
    assert_consistent(&h);
    Ok(())
}

#[test]
fn referenced_nodes_are_auto_created() -> Result<()> {
    let mut h = Hierarchy::new();
    h.set_hierarchy(&id("N"), &[id("P")], &[id("C")])?;

    assert!(h.node_exists(&id("P")));
    assert!(h.node_exists(&id("C")));
    assert_eq!(h.get_heads(), vec![id("P")]);
    assert_eq!(h.get_depth(&id("C"))?, 2);
    assert_consistent(&h);
    Ok(())
}

#[test]
fn del_node_detaches_every_edge() -> Result<()> {
    let mut h = chain()?;
    h.del_node(&id("B"))?;

    assert!(!h.node_exists(&id("B")));
    assert!(h.children_of(&id("A"))?.is_empty());
    assert!(h.parents_of(&id("C"))?.is_empty());
    assert_eq!(h.get_heads(), vec![id("A"), id("C")]);
    assert_consistent(&h);

    assert_eq!(h.del_node(&id("B")).unwrap_err(), Error::HierarchyNotFound);
    Ok(())
}

#[test]
fn del_parents_and_children() -> Result<()> {
    let mut h = Hierarchy::new();
    h.set_hierarchy(&id("M"), &[id("P"), id("Q")], &[id("X"), id("Y")])?;

    h.del_parents(&id("M"))?;
    assert!(h.parents_of(&id("M"))?.is_empty());
    assert!(h.get_heads().contains(&id("M")));

    h.del_children(&id("M"))?;
    assert!(h.children_of(&id("M"))?.is_empty());
    assert_eq!(h.get_heads().len(), 5);
    assert_consistent(&h);
    Ok(())
}

#[test]
fn traversal_directions_cover_the_expected_nodes() -> Result<()> {
    // Diamond: A -> B, A -> C, B -> D, C -> D.
    let mut h = Hierarchy::new();
    h.add_hierarchy(&id("A"), &[], &[id("B"), id("C")])?;
    h.add_hierarchy(&id("D"), &[id("B"), id("C")], &[])?;

    let visit = |h: &mut Hierarchy, origin: &str, dir: TraversalDir| -> Result<Vec<NodeId>> {
        let mut seen = Vec::new();
        h.traverse(&id(origin), dir, |node, _| {
            seen.push(*node);
            false
        })?;
        seen.sort();
        Ok(seen)
    };

    assert_eq!(visit(&mut h, "D", TraversalDir::Node)?, vec![id("D")]);

    let expected_up = vec![id("A"), id("B"), id("C"), id("D")];
    assert_eq!(visit(&mut h, "D", TraversalDir::BfsAncestors)?, expected_up);
    assert_eq!(visit(&mut h, "D", TraversalDir::DfsAncestors)?, expected_up);

    let expected_down = vec![id("A"), id("B"), id("C"), id("D")];
    assert_eq!(
        visit(&mut h, "A", TraversalDir::BfsDescendants)?,
        expected_down
    );
    assert_eq!(
        visit(&mut h, "A", TraversalDir::DfsDescendants)?,
        expected_down
    );

    // Full traversal reaches a disconnected head as well.
    h.add_hierarchy(&id("Z"), &[], &[])?;
    let mut all = visit(&mut h, "A", TraversalDir::DfsFull)?;
    all.sort();
    assert_eq!(all.len(), 5);

    Ok(())
}

#[test]
fn traversal_stops_when_the_callback_asks() -> Result<()> {
    let mut h = chain()?;

    let mut visited = 0usize;
    h.traverse(&id("A"), TraversalDir::BfsDescendants, |_, _| {
        visited += 1;
        true
    })?;
    assert_eq!(visited, 1);

    h.traverse(&id("missing"), TraversalDir::BfsDescendants, |_, _| false)
        .expect_err("traversal from a missing node must fail");
    Ok(())
}

#[test]
fn repeated_traversals_reuse_stamps_without_clearing() -> Result<()> {
    let mut h = chain()?;

    for _ in 0..100 {
        let mut count = 0usize;
        h.traverse(&id("A"), TraversalDir::DfsDescendants, |_, _| {
            count += 1;
            false
        })?;
        assert_eq!(count, 3);
    }
    Ok(())
}
