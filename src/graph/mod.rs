//! Graph store: the node map and its pure mutation primitives.
//!
//! The store is an immutable-update container. Every mutation takes the
//! current store read-only and returns a wholly new store; nothing mutates
//! its input in place. Edges are not standalone entities — an edge exists
//! exactly when a child id appears in a parent's `children` list.
//!
//! Two permissive behaviors are deliberate and must be preserved:
//! duplicate edges are legal (they render twice downstream), and dangling
//! child ids are tolerated by traversal rather than rejected.

pub mod toposort;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Separator in composite edge ids (`"{fromId}--{toId}"`).
pub const EDGE_ID_SEPARATOR: &str = "--";

/// Default priority rank for nodes with no explicit priority.
pub const DEFAULT_PRIORITY: u8 = 3;

/// Opaque unique identifier for a node. Fresh ids are UUID v4 strings.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Generate a fresh random id.
    pub fn fresh() -> Self {
        NodeId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for display: the first eight characters.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

/// Completion status of a node. Unset means "not started / someday".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Done,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Done => "done",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of item a node represents. Defaults to `Task` when unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Task,
    Goal,
    Project,
    Problem,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Task => "task",
            NodeKind::Goal => "goal",
            NodeKind::Project => "project",
            NodeKind::Problem => "problem",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, GraphError> {
        match raw {
            "task" => Ok(NodeKind::Task),
            "goal" => Ok(NodeKind::Goal),
            "project" => Ok(NodeKind::Project),
            "problem" => Ok(NodeKind::Problem),
            other => Err(GraphError::InvalidKind {
                given: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the new edge an anchor node sits on when creating a
/// connected node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The new node becomes a child of the anchor.
    Child,
    /// The new node becomes a parent of the anchor.
    Parent,
}

/// A task/goal/project/problem item in the graph.
///
/// `children` is the only persisted relation; parent lists and score vectors
/// are derived on every read by the toposorter and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub value: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    pub kind: Option<NodeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<f64>,
    #[serde(default)]
    pub children: Vec<NodeId>,
}

impl Node {
    /// Create a node with the current timestamp and no children.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            created_at: Utc::now(),
            status: None,
            kind: None,
            priority: None,
            pinned: None,
            notes: None,
            estimate: None,
            children: Vec::new(),
        }
    }

    /// Effective priority rank, defaulting missing priority to 3.
    pub fn priority_rank(&self) -> u8 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned.unwrap_or(false)
    }
}

/// The aggregate: a mapping from node id to node.
///
/// A `BTreeMap` keeps iteration and serialization deterministic, which the
/// abort short-circuit relies on (an aborted mutation must leave the
/// persisted bytes untouched).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStore {
    pub nodes: BTreeMap<NodeId, Node>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Node)> {
        self.nodes.iter()
    }

    /// Insert a new node with a fresh id and empty children.
    pub fn add_node(&self, value: impl Into<String>) -> (GraphStore, NodeId) {
        let id = NodeId::fresh();
        let mut next = self.clone();
        next.nodes.insert(id.clone(), Node::new(value));
        (next, id)
    }

    /// Insert a new empty node connected to `anchor`.
    ///
    /// With `Direction::Child` the new id is appended to the anchor's
    /// children; with `Direction::Parent` the anchor's id is appended to the
    /// new node's children. A missing anchor fails silently and leaves an
    /// orphan, matching the permissive edge rules.
    pub fn add_node_with_connection(
        &self,
        anchor: &NodeId,
        direction: Direction,
    ) -> (GraphStore, NodeId) {
        let id = NodeId::fresh();
        let mut node = Node::new("");
        let mut next = self.clone();
        match direction {
            Direction::Child => {
                if let Some(anchor_node) = next.nodes.get_mut(anchor) {
                    anchor_node.children.push(id.clone());
                }
            }
            Direction::Parent => {
                if next.nodes.contains_key(anchor) {
                    node.children.push(anchor.clone());
                }
            }
        }
        next.nodes.insert(id.clone(), node);
        (next, id)
    }

    /// Remove a node and strip its id from every other node's children.
    pub fn delete_node(&self, id: &NodeId) -> Result<GraphStore, GraphError> {
        if !self.nodes.contains_key(id) {
            return Err(GraphError::NotFound {
                prefix: id.to_string(),
            });
        }
        let mut next = self.clone();
        next.nodes.remove(id);
        for node in next.nodes.values_mut() {
            node.children.retain(|child| child != id);
        }
        Ok(next)
    }

    /// Append `to` to `from`'s children.
    ///
    /// No cycle or duplicate checks: a duplicate edge is legal and simply
    /// renders twice.
    pub fn add_edge(&self, from: &NodeId, to: &NodeId) -> Result<GraphStore, GraphError> {
        let mut next = self.clone();
        let node = next.nodes.get_mut(from).ok_or_else(|| GraphError::NotFound {
            prefix: from.to_string(),
        })?;
        node.children.push(to.clone());
        Ok(next)
    }

    /// Remove the first occurrence of `to` from `from`'s children, addressed
    /// by the composite edge id `"{fromId}--{toId}"`. Idempotent when the
    /// child id is already absent.
    pub fn delete_edge(&self, composite: &str) -> Result<GraphStore, GraphError> {
        let (from, to) = parse_edge_id(composite)?;
        let mut next = self.clone();
        let node = next.nodes.get_mut(&from).ok_or_else(|| GraphError::NotFound {
            prefix: from.to_string(),
        })?;
        if let Some(pos) = node.children.iter().position(|child| *child == to) {
            node.children.remove(pos);
        }
        Ok(next)
    }

    /// Set or clear a node's status. `"unset"` clears the field; anything
    /// other than `"active"`, `"done"`, or `"unset"` is rejected.
    pub fn set_status(&self, id: &NodeId, raw: &str) -> Result<GraphStore, GraphError> {
        let status = match raw {
            "active" => Some(Status::Active),
            "done" => Some(Status::Done),
            "unset" => None,
            other => {
                return Err(GraphError::InvalidStatus {
                    given: other.to_string(),
                });
            }
        };
        self.update(id, |node| {
            node.status = status;
            Ok(())
        })
    }

    /// Replace a node's priority (0 = most urgent, 4 = least). Aborts when
    /// the value is unchanged so the caller can skip an unnecessary
    /// persistence/render cycle.
    pub fn set_priority(&self, id: &NodeId, priority: u8) -> Result<GraphStore, GraphError> {
        if priority > 4 {
            return Err(GraphError::InvalidPriority {
                given: priority.to_string(),
            });
        }
        self.update(id, |node| {
            if node.priority == Some(priority) {
                return Err(GraphError::Aborted);
            }
            node.priority = Some(priority);
            Ok(())
        })
    }

    /// Replace a node's type.
    pub fn set_kind(&self, id: &NodeId, kind: NodeKind) -> Result<GraphStore, GraphError> {
        self.update(id, |node| {
            node.kind = Some(kind);
            Ok(())
        })
    }

    /// Replace a node's display value. Aborts when unchanged.
    pub fn set_value(&self, id: &NodeId, value: &str) -> Result<GraphStore, GraphError> {
        self.update(id, |node| {
            if node.value == value {
                return Err(GraphError::Aborted);
            }
            node.value = value.to_string();
            Ok(())
        })
    }

    /// Replace a node's free-text notes.
    pub fn set_notes(&self, id: &NodeId, notes: &str) -> Result<GraphStore, GraphError> {
        self.update(id, |node| {
            node.notes = Some(notes.to_string());
            Ok(())
        })
    }

    /// Replace a node's pinned flag.
    pub fn set_pinned(&self, id: &NodeId, pinned: bool) -> Result<GraphStore, GraphError> {
        self.update(id, |node| {
            node.pinned = Some(pinned);
            Ok(())
        })
    }

    /// Replace a node's numeric effort estimate.
    pub fn set_estimate(&self, id: &NodeId, estimate: f64) -> Result<GraphStore, GraphError> {
        self.update(id, |node| {
            node.estimate = Some(estimate);
            Ok(())
        })
    }

    /// Resolve a short unambiguous prefix of a node id.
    pub fn reconcile_id(&self, prefix: &str) -> Result<NodeId, GraphError> {
        let mut found: Option<&NodeId> = None;
        let mut matches = 0usize;
        for id in self.nodes.keys() {
            if id.as_str().starts_with(prefix) {
                matches += 1;
                found = Some(id);
            }
        }
        match matches {
            0 => Err(GraphError::NotFound {
                prefix: prefix.to_string(),
            }),
            1 => Ok(found
                .cloned()
                .ok_or(GraphError::NotFound {
                    prefix: prefix.to_string(),
                })?),
            n => Err(GraphError::AmbiguousPrefix {
                prefix: prefix.to_string(),
                matches: n,
            }),
        }
    }

    fn update(
        &self,
        id: &NodeId,
        apply: impl FnOnce(&mut Node) -> Result<(), GraphError>,
    ) -> Result<GraphStore, GraphError> {
        let mut next = self.clone();
        let node = next.nodes.get_mut(id).ok_or_else(|| GraphError::NotFound {
            prefix: id.to_string(),
        })?;
        apply(node)?;
        Ok(next)
    }
}

/// Split a composite edge id into its `(from, to)` node ids.
pub fn parse_edge_id(composite: &str) -> Result<(NodeId, NodeId), GraphError> {
    let (from, to) = composite
        .split_once(EDGE_ID_SEPARATOR)
        .ok_or_else(|| GraphError::InvalidEdgeId {
            given: composite.to_string(),
        })?;
    if from.is_empty() || to.is_empty() {
        return Err(GraphError::InvalidEdgeId {
            given: composite.to_string(),
        });
    }
    Ok((NodeId::from(from), NodeId::from(to)))
}

/// Build a composite edge id from its endpoints.
pub fn edge_id(from: &NodeId, to: &NodeId) -> String {
    format!("{from}{EDGE_ID_SEPARATOR}{to}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(values: &[&str]) -> (GraphStore, Vec<NodeId>) {
        let mut store = GraphStore::new();
        let mut ids = Vec::new();
        for value in values {
            let (next, id) = store.add_node(*value);
            store = next;
            ids.push(id);
        }
        (store, ids)
    }

    #[test]
    fn add_node_does_not_mutate_input() {
        let store = GraphStore::new();
        let (next, id) = store.add_node("a");
        assert!(store.is_empty());
        assert_eq!(next.len(), 1);
        assert_eq!(next.get(&id).map(|n| n.value.as_str()), Some("a"));
    }

    #[test]
    fn add_connected_child() {
        let (store, ids) = store_with(&["anchor"]);
        let (next, new_id) = store.add_node_with_connection(&ids[0], Direction::Child);
        let anchor = next.get(&ids[0]).expect("anchor kept");
        assert_eq!(anchor.children, vec![new_id.clone()]);
        assert!(next.get(&new_id).expect("new node").children.is_empty());
    }

    #[test]
    fn add_connected_parent() {
        let (store, ids) = store_with(&["anchor"]);
        let (next, new_id) = store.add_node_with_connection(&ids[0], Direction::Parent);
        assert_eq!(
            next.get(&new_id).expect("new node").children,
            vec![ids[0].clone()]
        );
    }

    #[test]
    fn add_connected_missing_anchor_leaves_orphan() {
        let store = GraphStore::new();
        let ghost = NodeId::from("nope");
        let (next, new_id) = store.add_node_with_connection(&ghost, Direction::Child);
        assert_eq!(next.len(), 1);
        assert!(next.get(&new_id).expect("orphan").children.is_empty());
    }

    #[test]
    fn delete_node_prunes_all_references() {
        let (store, ids) = store_with(&["a", "b", "c"]);
        let store = store.add_edge(&ids[0], &ids[1]).unwrap();
        let store = store.add_edge(&ids[2], &ids[1]).unwrap();

        let next = store.delete_node(&ids[1]).unwrap();
        assert!(!next.contains(&ids[1]));
        for (_, node) in next.iter() {
            assert!(!node.children.contains(&ids[1]));
        }
    }

    #[test]
    fn delete_missing_node_fails() {
        let store = GraphStore::new();
        let err = store.delete_node(&NodeId::from("ghost")).unwrap_err();
        assert!(matches!(err, GraphError::NotFound { .. }));
    }

    #[test]
    fn duplicate_edges_are_legal() {
        let (store, ids) = store_with(&["a", "b"]);
        let store = store.add_edge(&ids[0], &ids[1]).unwrap();
        let store = store.add_edge(&ids[0], &ids[1]).unwrap();
        assert_eq!(store.get(&ids[0]).unwrap().children.len(), 2);
    }

    #[test]
    fn edge_round_trip_restores_children() {
        let (store, ids) = store_with(&["a", "b"]);
        let before = store.get(&ids[0]).unwrap().children.clone();
        let store = store.add_edge(&ids[0], &ids[1]).unwrap();
        let store = store.delete_edge(&edge_id(&ids[0], &ids[1])).unwrap();
        assert_eq!(store.get(&ids[0]).unwrap().children, before);
    }

    #[test]
    fn delete_edge_removes_only_first_occurrence() {
        let (store, ids) = store_with(&["a", "b"]);
        let store = store.add_edge(&ids[0], &ids[1]).unwrap();
        let store = store.add_edge(&ids[0], &ids[1]).unwrap();
        let store = store.delete_edge(&edge_id(&ids[0], &ids[1])).unwrap();
        assert_eq!(store.get(&ids[0]).unwrap().children.len(), 1);
    }

    #[test]
    fn delete_edge_is_idempotent_when_absent() {
        let (store, ids) = store_with(&["a", "b"]);
        let next = store.delete_edge(&edge_id(&ids[0], &ids[1])).unwrap();
        assert!(next.get(&ids[0]).unwrap().children.is_empty());
    }

    #[test]
    fn malformed_edge_id_is_rejected() {
        let (store, _) = store_with(&["a"]);
        assert!(matches!(
            store.delete_edge("no-separator-here").unwrap_err(),
            GraphError::InvalidEdgeId { .. }
        ));
    }

    #[test]
    fn set_status_validates_values() {
        let (store, ids) = store_with(&["a"]);
        let store = store.set_status(&ids[0], "active").unwrap();
        assert_eq!(store.get(&ids[0]).unwrap().status, Some(Status::Active));

        let store = store.set_status(&ids[0], "unset").unwrap();
        assert_eq!(store.get(&ids[0]).unwrap().status, None);

        assert!(matches!(
            store.set_status(&ids[0], "blocked").unwrap_err(),
            GraphError::InvalidStatus { .. }
        ));
    }

    #[test]
    fn set_value_aborts_when_unchanged() {
        let (store, ids) = store_with(&["same"]);
        assert!(matches!(
            store.set_value(&ids[0], "same").unwrap_err(),
            GraphError::Aborted
        ));
        let next = store.set_value(&ids[0], "different").unwrap();
        assert_eq!(next.get(&ids[0]).unwrap().value, "different");
    }

    #[test]
    fn set_priority_aborts_when_unchanged() {
        let (store, ids) = store_with(&["a"]);
        let store = store.set_priority(&ids[0], 1).unwrap();
        assert!(matches!(
            store.set_priority(&ids[0], 1).unwrap_err(),
            GraphError::Aborted
        ));
        // Setting the default rank on a node without explicit priority is
        // still a change: `None` and `Some(3)` are different stored states.
        let (store2, ids2) = store_with(&["b"]);
        assert!(store2.set_priority(&ids2[0], DEFAULT_PRIORITY).is_ok());
    }

    #[test]
    fn set_priority_rejects_out_of_range() {
        let (store, ids) = store_with(&["a"]);
        assert!(matches!(
            store.set_priority(&ids[0], 5).unwrap_err(),
            GraphError::InvalidPriority { .. }
        ));
    }

    #[test]
    fn reconcile_id_prefix_resolution() {
        let mut store = GraphStore::new();
        store.nodes.insert(NodeId::from("abc1"), Node::new("x"));
        store.nodes.insert(NodeId::from("abd2"), Node::new("y"));

        assert_eq!(store.reconcile_id("abc").unwrap(), NodeId::from("abc1"));
        assert!(matches!(
            store.reconcile_id("ab").unwrap_err(),
            GraphError::AmbiguousPrefix { matches: 2, .. }
        ));
        assert!(matches!(
            store.reconcile_id("zz").unwrap_err(),
            GraphError::NotFound { .. }
        ));
    }

    #[test]
    fn node_short_id() {
        let id = NodeId::from("0123456789abcdef");
        assert_eq!(id.short(), "01234567");
        let tiny = NodeId::from("ab");
        assert_eq!(tiny.short(), "ab");
    }
}
