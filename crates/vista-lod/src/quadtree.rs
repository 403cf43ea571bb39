//! Arena-backed terrain quadtree.
//!
//! Nodes live in an `FxHashMap` keyed by [`NodeId`]. Parents refer to their
//! children by id and children keep a plain id back to their parent, so a
//! build result that names a node can be matched against the tree without
//! holding any reference into it.

use std::fmt;

use rustc_hash::FxHashMap;
use vista_math::{Aabb, Quadrant};

use crate::geometry::{GeometrySlot, Retired};

/// Unique, never-reused node identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn get(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Lifecycle state, derived from the node's children and flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Leaf with nothing in flight.
    LeafIdle,
    /// Leaf waiting for a build result.
    LeafBuilding,
    /// Node with four children.
    Interior,
}

#[derive(Debug)]
pub struct QuadNode {
    id: NodeId,
    depth: u32,
    parent: Option<NodeId>,
    children: Option<[NodeId; 4]>,
    /// XY footprint with the placeholder height range.
    footprint: Aabb,
    /// Box used for distance tests: the placeholder until a build lands.
    pub(crate) bounds: Aabb,
    pub(crate) building: bool,
    pub(crate) subtree_built: bool,
    /// The last build attempt failed or was cancelled; dispatch again.
    pub(crate) retry: bool,
    /// Builds dispatched for this node whose completion has not arrived.
    pub(crate) outstanding: u32,
    pub(crate) revision: u64,
    pub(crate) geometry: GeometrySlot,
    pub(crate) retired: Retired,
}

impl QuadNode {
    fn new(id: NodeId, depth: u32, parent: Option<NodeId>, footprint: Aabb) -> Self {
        Self {
            id,
            depth,
            parent,
            children: None,
            footprint,
            bounds: footprint,
            building: false,
            subtree_built: false,
            retry: false,
            outstanding: 0,
            revision: 0,
            geometry: GeometrySlot::Empty,
            retired: Retired::default(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> Option<[NodeId; 4]> {
        self.children
    }

    pub fn footprint(&self) -> &Aabb {
        &self.footprint
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn state(&self) -> NodeState {
        match (self.children.is_some(), self.building) {
            (true, _) => NodeState::Interior,
            (false, true) => NodeState::LeafBuilding,
            (false, false) => NodeState::LeafIdle,
        }
    }

    pub fn is_building(&self) -> bool {
        self.building
    }

    pub fn is_subtree_built(&self) -> bool {
        self.subtree_built
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn has_committed_geometry(&self) -> bool {
        self.geometry.is_committed()
    }

    pub fn has_pending_geometry(&self) -> bool {
        self.geometry.is_pending()
    }

    /// Objects on this node's retired lists.
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }
}

#[derive(Debug)]
pub(crate) struct QuadTree {
    nodes: FxHashMap<NodeId, QuadNode>,
    root: NodeId,
    next_id: u64,
}

impl QuadTree {
    pub fn new(root_footprint: Aabb) -> Self {
        let root = NodeId(0);
        let mut nodes = FxHashMap::default();
        nodes.insert(root, QuadNode::new(root, 0, None, root_footprint));
        Self {
            nodes,
            root,
            next_id: 1,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&QuadNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut QuadNode> {
        self.nodes.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &QuadNode> {
        self.nodes.values()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &QuadNode> {
        self.nodes.values().filter(|n| n.is_leaf())
    }

    /// Give a leaf four children covering its quadrants.
    ///
    /// Returns `None` if `id` is unknown or already interior.
    pub fn split(&mut self, id: NodeId) -> Option<[NodeId; 4]> {
        let node = self.nodes.get(&id)?;
        if !node.is_leaf() {
            return None;
        }
        let depth = node.depth + 1;
        let footprint = node.footprint;

        let children = Quadrant::ALL.map(|q| {
            let child = NodeId(self.next_id);
            self.next_id += 1;
            (child, footprint.quadrant(q))
        });
        for (child, quadrant) in children {
            self.nodes
                .insert(child, QuadNode::new(child, depth, Some(id), quadrant));
        }

        let ids = children.map(|(child, _)| child);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.children = Some(ids);
        }
        Some(ids)
    }

    /// Detach and return every descendant of `id`. The node itself becomes a
    /// leaf.
    pub fn remove_descendants(&mut self, id: NodeId) -> Vec<QuadNode> {
        let Some(children) = self.nodes.get_mut(&id).and_then(|n| n.children.take()) else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        let mut stack: Vec<NodeId> = children.to_vec();
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                stack.extend(node.children.into_iter().flatten());
                removed.push(node);
            }
        }
        removed
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(parent) = cur {
            out.push(parent);
            cur = self.nodes.get(&parent).and_then(|n| n.parent);
        }
        out
    }

    /// `id` and all of its descendants, parents before children.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.get(&next) {
                out.push(next);
                stack.extend(node.children.into_iter().flatten().rev());
            }
        }
        out
    }

    /// True if every ancestor of `id` has its subtree built. Holds for the root.
    pub fn all_ancestors_built(&self, id: NodeId) -> bool {
        self.ancestors(id)
            .iter()
            .all(|a| self.nodes.get(a).is_some_and(|n| n.subtree_built))
    }

    /// Deepest leaf whose footprint contains `(x, y)`.
    pub fn leaf_at(&self, x: f64, y: f64) -> Option<&QuadNode> {
        let mut node = self.nodes.get(&self.root)?;
        if !node.footprint.contains_xy(x, y) {
            return None;
        }
        while let Some(children) = node.children {
            node = children
                .iter()
                .filter_map(|c| self.nodes.get(c))
                .find(|c| c.footprint.contains_xy(x, y))?;
        }
        Some(node)
    }
}
