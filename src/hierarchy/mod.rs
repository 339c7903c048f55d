//! Directed acyclic hierarchy of nodes with traversal and orphan-head
//! tracking.
//!
//! Nodes live in an arena keyed by [`NodeId`]; edges are id references in
//! per-node ordered vectors, so the graph carries no cyclic ownership.
//! Traversals stamp nodes with the hierarchy's transaction counter, which
//! removes the need to clear visit marks afterwards.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::error::{Error, Result};
use crate::subscriptions::{MarkerId, SubscriptionRegistry};
use crate::svector::SVector;
use crate::types::{NodeId, TraversalDir};

mod snapshot;
pub use snapshot::{HIERARCHY_ENCODING_VERSION, load as snapshot_load, save as snapshot_save};

const INITIAL_EDGE_CAPACITY: usize = 2;

/// Per-node metadata maintained by the engine's observers.
#[derive(Debug, Clone)]
pub struct NodeMetadata {
    /// Subscription markers whose traversal coverage includes this node.
    pub sub_markers: SVector<MarkerId>,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            sub_markers: SVector::sorted(1),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) parents: SVector<NodeId>,
    pub(crate) children: SVector<NodeId>,
    visit_stamp: u64,
    pub(crate) metadata: NodeMetadata,
}

impl Node {
    fn new() -> Self {
        Self {
            parents: SVector::sorted(INITIAL_EDGE_CAPACITY),
            children: SVector::sorted(INITIAL_EDGE_CAPACITY),
            visit_stamp: 0,
            metadata: NodeMetadata::default(),
        }
    }
}

/// What changed about a node, for deferred subscription evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    /// The node's parent or child edge set changed.
    Hierarchy,
    /// A named field of the node changed.
    Field(String),
}

/// A recorded mutation awaiting marker evaluation.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    /// The mutated node.
    pub node: NodeId,
    /// What changed.
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, Copy)]
enum Relationship {
    Parent,
    Child,
}

/// The hierarchy: node index, orphan heads, traversal engine and the
/// subscription index observing it.
#[derive(Debug)]
pub struct Hierarchy {
    index: BTreeMap<NodeId, Node>,
    heads: SVector<NodeId>,
    current_trx: u64,
    pub(crate) subs: SubscriptionRegistry,
    pending: Vec<ChangeRecord>,
}

impl Default for Hierarchy {
    fn default() -> Self {
        Self::new()
    }
}

impl Hierarchy {
    /// Creates an empty hierarchy.
    pub fn new() -> Self {
        Self {
            index: BTreeMap::new(),
            heads: SVector::sorted(INITIAL_EDGE_CAPACITY),
            current_trx: 0,
            subs: SubscriptionRegistry::default(),
            pending: Vec::new(),
        }
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` when a node with `id` exists.
    pub fn node_exists(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    /// Iterates every node id in index order.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.index.keys()
    }

    /// Returns the metadata of the node with `id`.
    pub fn get_metadata(&self, id: &NodeId) -> Result<&NodeMetadata> {
        Ok(&self.node(id)?.metadata)
    }

    /// Returns the parent ids of the node with `id`.
    pub fn parents_of(&self, id: &NodeId) -> Result<&[NodeId]> {
        Ok(self.node(id)?.parents.as_slice())
    }

    /// Returns the child ids of the node with `id`.
    pub fn children_of(&self, id: &NodeId) -> Result<&[NodeId]> {
        Ok(self.node(id)?.children.as_slice())
    }

    /// Returns the orphan heads in id order.
    pub fn get_heads(&self) -> Vec<NodeId> {
        self.heads.iter().copied().collect()
    }

    /// Returns the length of the longest ancestor chain above `id`.
    ///
    /// A head has depth zero.
    pub fn get_depth(&self, id: &NodeId) -> Result<usize> {
        self.node(id)?;

        let mut memo: HashMap<NodeId, usize> = HashMap::new();
        let mut stack = vec![(*id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if memo.contains_key(&current) {
                continue;
            }
            let node = self.node(&current)?;
            if expanded {
                let depth = node
                    .parents
                    .iter()
                    .map(|p| memo.get(p).copied().unwrap_or(0) + 1)
                    .max()
                    .unwrap_or(0);
                memo.insert(current, depth);
            } else {
                stack.push((current, true));
                for parent in &node.parents {
                    if !memo.contains_key(parent) {
                        stack.push((*parent, false));
                    }
                }
            }
        }

        Ok(memo[id])
    }

    /// Upserts node `id`, replacing both its parent and child edge sets.
    ///
    /// Missing referenced ids are auto-created. An edge set that would form
    /// a cycle is refused; if `id` itself was created by this call it is
    /// destroyed again before the error returns.
    pub fn set_hierarchy(
        &mut self,
        id: &NodeId,
        parents: &[NodeId],
        children: &[NodeId],
    ) -> Result<()> {
        let created = self.upsert_node(id);

        let old_parents: Vec<NodeId> = self.node(id)?.parents.iter().copied().collect();
        let old_children: Vec<NodeId> = self.node(id)?.children.iter().copied().collect();

        let mut endpoints: Vec<NodeId> = vec![*id];
        endpoints.extend_from_slice(&old_parents);
        endpoints.extend_from_slice(&old_children);
        endpoints.extend(parents.iter().chain(children).copied());

        let affected = self.collect_markers_on(&endpoints);
        for marker in &affected {
            self.clear_marker_coverage(*marker);
        }

        let result = self.rewire(id, &old_parents, &old_children, parents, children);

        if result.is_err() && created {
            self.detach_and_remove(id);
        }

        self.reattach_markers(&affected);

        match result {
            Ok(changed) => {
                self.record_hierarchy_changes(changed);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Replaces the parent set of an existing node.
    pub fn set_parents(&mut self, id: &NodeId, parents: &[NodeId]) -> Result<()> {
        self.node(id)?;
        let children: Vec<NodeId> = self.node(id)?.children.iter().copied().collect();
        self.set_hierarchy(id, parents, &children)
    }

    /// Replaces the child set of an existing node.
    pub fn set_children(&mut self, id: &NodeId, children: &[NodeId]) -> Result<()> {
        self.node(id)?;
        let parents: Vec<NodeId> = self.node(id)?.parents.iter().copied().collect();
        self.set_hierarchy(id, &parents, children)
    }

    /// Upserts node `id`, adding the given edges to the existing sets.
    ///
    /// Already-present edges are kept as they are, which makes repeated
    /// calls idempotent.
    pub fn add_hierarchy(
        &mut self,
        id: &NodeId,
        parents: &[NodeId],
        children: &[NodeId],
    ) -> Result<()> {
        let created = self.upsert_node(id);

        let mut endpoints: Vec<NodeId> = vec![*id];
        endpoints.extend(parents.iter().chain(children).copied());
        let affected = self.collect_markers_on(&endpoints);
        for marker in &affected {
            self.clear_marker_coverage(*marker);
        }

        let result = self.wire_union(id, parents, children);

        if result.is_err() && created {
            self.detach_and_remove(id);
        }

        self.reattach_markers(&affected);

        match result {
            Ok(changed) => {
                self.record_hierarchy_changes(changed);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Removes the listed edges of an existing node.
    ///
    /// Removing an edge that does not exist is a no-op.
    pub fn del_hierarchy(
        &mut self,
        id: &NodeId,
        parents: &[NodeId],
        children: &[NodeId],
    ) -> Result<()> {
        self.node(id)?;

        let mut endpoints: Vec<NodeId> = vec![*id];
        endpoints.extend(parents.iter().chain(children).copied());
        let affected = self.collect_markers_on(&endpoints);
        for marker in &affected {
            self.clear_marker_coverage(*marker);
        }

        let mut changed = Vec::new();
        for parent in parents {
            if self.remove_edge(parent, id) {
                note_changed(&mut changed, *parent);
                note_changed(&mut changed, *id);
            }
        }
        for child in children {
            if self.remove_edge(id, child) {
                note_changed(&mut changed, *id);
                note_changed(&mut changed, *child);
            }
        }

        self.reattach_markers(&affected);

        self.record_hierarchy_changes(changed);
        Ok(())
    }

    /// Removes every child edge of `id`.
    pub fn del_children(&mut self, id: &NodeId) -> Result<()> {
        let children: Vec<NodeId> = self.node(id)?.children.iter().copied().collect();
        self.del_hierarchy(id, &[], &children)
    }

    /// Removes every parent edge of `id`.
    pub fn del_parents(&mut self, id: &NodeId) -> Result<()> {
        let parents: Vec<NodeId> = self.node(id)?.parents.iter().copied().collect();
        self.del_hierarchy(id, &parents, &[])
    }

    /// Deletes the node with `id`.
    ///
    /// Marker cleanup runs first, then every edge is detached and the node
    /// is removed from the index and the head set.
    pub fn del_node(&mut self, id: &NodeId) -> Result<()> {
        self.node(id)?;

        let affected = self.clear_node_markers(id);

        let parents: Vec<NodeId> = self.node(id)?.parents.iter().copied().collect();
        let children: Vec<NodeId> = self.node(id)?.children.iter().copied().collect();
        self.detach_and_remove(id);

        self.reattach_markers(&affected);

        let mut changed = Vec::new();
        for neighbor in parents.into_iter().chain(children) {
            note_changed(&mut changed, neighbor);
        }
        self.record_hierarchy_changes(changed);
        Ok(())
    }

    /// Lists the nodes reachable above `id`, in unspecified order.
    pub fn find_ancestors(&mut self, id: &NodeId) -> Result<Vec<NodeId>> {
        self.collect_related(id, Relationship::Parent)
    }

    /// Lists the nodes reachable below `id`, in unspecified order.
    pub fn find_descendants(&mut self, id: &NodeId) -> Result<Vec<NodeId>> {
        self.collect_related(id, Relationship::Child)
    }

    /// Visits nodes starting from `id` in the given direction.
    ///
    /// The callback returns `true` to stop the traversal early.
    pub fn traverse(
        &mut self,
        id: &NodeId,
        dir: TraversalDir,
        mut cb: impl FnMut(&NodeId, &NodeMetadata) -> bool,
    ) -> Result<()> {
        match dir {
            TraversalDir::Node => {
                let node = self.node(id)?;
                cb(id, &node.metadata);
                Ok(())
            }
            TraversalDir::BfsAncestors => self.bfs(id, Relationship::Parent, &mut cb),
            TraversalDir::BfsDescendants => self.bfs(id, Relationship::Child, &mut cb),
            TraversalDir::DfsAncestors => {
                let trx = self.begin_trx();
                self.dfs(trx, id, Relationship::Parent, &mut cb)?;
                Ok(())
            }
            TraversalDir::DfsDescendants => {
                let trx = self.begin_trx();
                self.dfs(trx, id, Relationship::Child, &mut cb)?;
                Ok(())
            }
            TraversalDir::DfsFull => {
                let trx = self.begin_trx();
                let heads = self.get_heads();
                for head in heads {
                    if self.dfs(trx, &head, Relationship::Child, &mut cb)? {
                        break;
                    }
                }
                Ok(())
            }
        }
    }

    /// Collects every node id a traversal from `id` in `dir` visits,
    /// including the origin.
    pub(crate) fn traverse_collect(
        &mut self,
        id: &NodeId,
        dir: TraversalDir,
    ) -> Result<Vec<NodeId>> {
        let mut visited = Vec::new();
        self.traverse(id, dir, |node, _| {
            visited.push(*node);
            false
        })?;
        Ok(visited)
    }

    /// Queues a field change record for deferred marker evaluation.
    pub fn record_field_change(&mut self, node: NodeId, field: &str) {
        self.pending.push(ChangeRecord {
            node,
            kind: ChangeKind::Field(field.to_string()),
        });
    }

    /// Takes the queued change records, in mutation order.
    pub fn take_changes(&mut self) -> Vec<ChangeRecord> {
        std::mem::take(&mut self.pending)
    }

    fn record_hierarchy_changes(&mut self, nodes: Vec<NodeId>) {
        for node in nodes {
            self.pending.push(ChangeRecord {
                node,
                kind: ChangeKind::Hierarchy,
            });
        }
    }

    fn node(&self, id: &NodeId) -> Result<&Node> {
        self.index.get(id).ok_or(Error::HierarchyNotFound)
    }

    fn node_mut(&mut self, id: &NodeId) -> Result<&mut Node> {
        self.index.get_mut(id).ok_or(Error::HierarchyNotFound)
    }

    pub(crate) fn metadata_mut(&mut self, id: &NodeId) -> Option<&mut NodeMetadata> {
        self.index.get_mut(id).map(|node| &mut node.metadata)
    }

    /// Creates the node when missing. Returns `true` when it was created.
    fn upsert_node(&mut self, id: &NodeId) -> bool {
        if self.index.contains_key(id) {
            return false;
        }
        self.index.insert(*id, Node::new());
        self.heads.insert(*id);
        true
    }

    pub(crate) fn insert_node_raw(&mut self, id: &NodeId) {
        self.upsert_node(id);
    }

    fn detach_and_remove(&mut self, id: &NodeId) {
        let Some(node) = self.index.get(id) else {
            return;
        };
        let parents: Vec<NodeId> = node.parents.iter().copied().collect();
        let children: Vec<NodeId> = node.children.iter().copied().collect();

        for parent in parents {
            self.remove_edge(&parent, id);
        }
        for child in children {
            self.remove_edge(id, &child);
        }

        self.index.remove(id);
        self.heads.remove(id);
    }

    fn rewire(
        &mut self,
        id: &NodeId,
        old_parents: &[NodeId],
        old_children: &[NodeId],
        parents: &[NodeId],
        children: &[NodeId],
    ) -> Result<Vec<NodeId>> {
        let mut changed = Vec::new();

        for parent in old_parents {
            if !parents.contains(parent) && self.remove_edge(parent, id) {
                note_changed(&mut changed, *parent);
                note_changed(&mut changed, *id);
            }
        }
        for child in old_children {
            if !children.contains(child) && self.remove_edge(id, child) {
                note_changed(&mut changed, *id);
                note_changed(&mut changed, *child);
            }
        }

        self.wire_union_into(id, parents, children, &mut changed)?;
        Ok(changed)
    }

    fn wire_union(
        &mut self,
        id: &NodeId,
        parents: &[NodeId],
        children: &[NodeId],
    ) -> Result<Vec<NodeId>> {
        let mut changed = Vec::new();
        self.wire_union_into(id, parents, children, &mut changed)?;
        Ok(changed)
    }

    fn wire_union_into(
        &mut self,
        id: &NodeId,
        parents: &[NodeId],
        children: &[NodeId],
        changed: &mut Vec<NodeId>,
    ) -> Result<()> {
        for parent in parents {
            self.upsert_node(parent);
            if self.add_edge(parent, id)? {
                note_changed(changed, *parent);
                note_changed(changed, *id);
            }
        }
        for child in children {
            self.upsert_node(child);
            if self.add_edge(id, child)? {
                note_changed(changed, *id);
                note_changed(changed, *child);
            }
        }
        Ok(())
    }

    /// Wires the directed edge `parent -> child`.
    ///
    /// Returns `false` when the edge already exists. Fails when the edge
    /// would close a cycle.
    fn add_edge(&mut self, parent: &NodeId, child: &NodeId) -> Result<bool> {
        if self.node(child)?.parents.contains(parent) {
            return Ok(false);
        }
        if self.would_create_cycle(parent, child)? {
            return Err(Error::HierarchyInvalid);
        }

        self.node_mut(parent)?.children.insert(*child);
        self.node_mut(child)?.parents.insert(*parent);
        self.update_head(child);
        Ok(true)
    }

    /// Removes the directed edge `parent -> child` from both sides.
    fn remove_edge(&mut self, parent: &NodeId, child: &NodeId) -> bool {
        let mut removed = false;
        if let Some(node) = self.index.get_mut(parent) {
            removed |= node.children.remove(child).is_some();
        }
        if let Some(node) = self.index.get_mut(child) {
            removed |= node.parents.remove(parent).is_some();
        }
        if removed {
            self.update_head(child);
        }
        removed
    }

    fn update_head(&mut self, id: &NodeId) {
        let Some(node) = self.index.get(id) else {
            return;
        };
        if node.parents.is_empty() {
            self.heads.insert(*id);
        } else {
            self.heads.remove(id);
        }
    }

    /// An edge `parent -> child` closes a cycle when `child` is already an
    /// ancestor of `parent` (or the two ends are the same node).
    fn would_create_cycle(&mut self, parent: &NodeId, child: &NodeId) -> Result<bool> {
        if parent == child {
            return Ok(true);
        }
        let ancestors = self.collect_related(parent, Relationship::Parent)?;
        Ok(ancestors.contains(child))
    }

    fn collect_related(&mut self, id: &NodeId, rel: Relationship) -> Result<Vec<NodeId>> {
        let trx = self.begin_trx();
        let origin = *id;
        let mut found = Vec::new();

        self.node(id)?;
        let mut stack = vec![origin];
        while let Some(current) = stack.pop() {
            let node = self.node_mut(&current)?;
            if node.visit_stamp == trx {
                continue;
            }
            node.visit_stamp = trx;
            if current != origin {
                found.push(current);
            }

            let node = self.node(&current)?;
            let adjacent = match rel {
                Relationship::Parent => &node.parents,
                Relationship::Child => &node.children,
            };
            stack.extend(adjacent.iter().copied());
        }

        Ok(found)
    }

    fn begin_trx(&mut self) -> u64 {
        self.current_trx += 1;
        self.current_trx
    }

    fn bfs(
        &mut self,
        id: &NodeId,
        rel: Relationship,
        cb: &mut impl FnMut(&NodeId, &NodeMetadata) -> bool,
    ) -> Result<()> {
        let trx = self.begin_trx();
        self.node_mut(id)?.visit_stamp = trx;

        let mut queue = VecDeque::from([*id]);
        while let Some(current) = queue.pop_front() {
            let node = self.node(&current)?;
            if cb(&current, &node.metadata) {
                return Ok(());
            }

            let adjacent: Vec<NodeId> = match rel {
                Relationship::Parent => node.parents.iter().copied().collect(),
                Relationship::Child => node.children.iter().copied().collect(),
            };
            for next in adjacent {
                let node = self.node_mut(&next)?;
                if node.visit_stamp != trx {
                    node.visit_stamp = trx;
                    queue.push_back(next);
                }
            }
        }
        Ok(())
    }

    /// Depth-first walk; returns `true` when the callback stopped it.
    fn dfs(
        &mut self,
        trx: u64,
        id: &NodeId,
        rel: Relationship,
        cb: &mut impl FnMut(&NodeId, &NodeMetadata) -> bool,
    ) -> Result<bool> {
        self.node(id)?;

        let mut stack = vec![*id];
        while let Some(current) = stack.pop() {
            let node = self.node_mut(&current)?;
            if node.visit_stamp == trx {
                continue;
            }
            node.visit_stamp = trx;

            let node = self.node(&current)?;
            if cb(&current, &node.metadata) {
                return Ok(true);
            }

            let adjacent = match rel {
                Relationship::Parent => &node.parents,
                Relationship::Child => &node.children,
            };
            stack.extend(adjacent.iter().copied());
        }
        Ok(false)
    }
}

fn note_changed(changed: &mut Vec<NodeId>, id: NodeId) {
    if !changed.contains(&id) {
        changed.push(id);
    }
}
