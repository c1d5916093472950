//! Toposorter and ordering policy: one deterministic global order over an
//! otherwise unordered node map with possibly-cyclic or dangling edges.
//!
//! Every node gets a score vector; the *propagated* vector is the best score
//! among the node and all of its descendants. A leaf by itself might rank
//! low, but if it is the most urgent item in an otherwise-idle subtree the
//! propagation bubbles the whole branch toward the front. The tie-break
//! precedence (pinned, then status, then priority, then recency) and the
//! max-of-self-and-best-child rule are load-bearing; do not reorder them.

use std::collections::{HashMap, HashSet};

use crate::graph::{GraphStore, Node, NodeId, Status};

/// Ordered tuple used to rank nodes and subtrees.
///
/// Components, first-difference-wins, higher is better:
/// `[pinned, status points, negated priority rank, creation epoch millis]`.
/// The derived lexicographic `Ord` is exactly the comparison the ordering
/// policy needs, and is a total order by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScoreVec(pub [i64; 4]);

impl ScoreVec {
    /// Score a single node, ignoring its descendants.
    pub fn for_node(node: &Node) -> Self {
        ScoreVec([
            if node.is_pinned() { 1 } else { 0 },
            status_points(node.status),
            -i64::from(node.priority_rank()),
            node.created_at.timestamp_millis(),
        ])
    }
}

/// Status contribution to the score vector.
///
/// Done items sink to the bottom so finished work stops resurfacing; active
/// items outrank untouched ones.
fn status_points(status: Option<Status>) -> i64 {
    match status {
        Some(Status::Done) => -1,
        Some(Status::Active) => 1,
        None => 0,
    }
}

/// A node enriched with everything the toposorter derives: resolved parents,
/// its own score, and the best score in its subtree.
#[derive(Debug, Clone)]
pub struct SortedNode {
    pub id: NodeId,
    /// Copy of the stored node with `children` re-sorted to the global order.
    pub node: Node,
    /// Ids of every node listing this one as a child.
    pub parents: Vec<NodeId>,
    /// The node's own score vector.
    pub score: ScoreVec,
    /// Best vector among this node and all reachable descendants.
    pub propagated: ScoreVec,
}

/// The globally sorted, topologically valid snapshot of all nodes.
///
/// Ephemeral: recomputed from the raw store on every mutation, never
/// persisted.
#[derive(Debug, Clone, Default)]
pub struct OrderedView {
    entries: Vec<SortedNode>,
    index: HashMap<NodeId, usize>,
    visit_order: Vec<NodeId>,
}

impl OrderedView {
    /// Derive the ordered view from a raw store.
    pub fn derive(store: &GraphStore) -> Self {
        Toposorter::new(store).run()
    }

    /// Entries in score-ranked order (best first).
    pub fn entries(&self) -> &[SortedNode] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &SortedNode> {
        self.entries.iter()
    }

    pub fn get(&self, id: &NodeId) -> Option<&SortedNode> {
        self.index.get(id).and_then(|&i| self.entries.get(i))
    }

    /// Global rank of a node, 0 = first.
    pub fn position(&self, id: &NodeId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Topological visit order: every node appears after all of its
    /// reachable children, cycles truncated by the visited set.
    pub fn visit_order(&self) -> &[NodeId] {
        &self.visit_order
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct Toposorter<'a> {
    store: &'a GraphStore,
    visited: HashSet<NodeId>,
    visit_order: Vec<NodeId>,
    propagated: HashMap<NodeId, ScoreVec>,
    parents: HashMap<NodeId, Vec<NodeId>>,
}

impl<'a> Toposorter<'a> {
    fn new(store: &'a GraphStore) -> Self {
        Self {
            store,
            visited: HashSet::with_capacity(store.len()),
            visit_order: Vec::with_capacity(store.len()),
            propagated: HashMap::with_capacity(store.len()),
            parents: HashMap::with_capacity(store.len()),
        }
    }

    fn run(mut self) -> OrderedView {
        // BTreeMap iteration makes the walk order, and therefore every
        // tie-broken output, deterministic across runs.
        for id in self.store.nodes.keys() {
            self.visit(id);
        }

        let mut entries: Vec<SortedNode> = self
            .visit_order
            .iter()
            .filter_map(|id| {
                let node = self.store.get(id)?;
                let score = ScoreVec::for_node(node);
                Some(SortedNode {
                    id: id.clone(),
                    node: node.clone(),
                    parents: self.parents.remove(id).unwrap_or_default(),
                    score,
                    propagated: self.propagated.get(id).copied().unwrap_or(score),
                })
            })
            .collect();

        // Stable sort over the topological visit order: ties (a parent whose
        // propagated vector came verbatim from a child) keep children first.
        entries.sort_by(|a, b| b.propagated.cmp(&a.propagated));

        let index: HashMap<NodeId, usize> = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.id.clone(), i))
            .collect();

        // Re-sort each child list to follow the global order so consumers
        // see one consistent left-to-right ordering. Dangling ids sink to
        // the end but are kept: they are a degraded state, not an error.
        for entry in &mut entries {
            entry
                .node
                .children
                .sort_by_key(|child| index.get(child).copied().unwrap_or(usize::MAX));
            entry.parents.sort_by_key(|parent| {
                index.get(parent).copied().unwrap_or(usize::MAX)
            });
        }

        OrderedView {
            entries,
            index,
            visit_order: self.visit_order,
        }
    }

    /// Depth-first postorder visit. Marking on entry makes the walk
    /// idempotent and truncates cycles instead of recursing forever.
    fn visit(&mut self, id: &NodeId) {
        if self.visited.contains(id) {
            return;
        }
        let Some(node) = self.store.get(id) else {
            // Dangling child id: treated as if the edge did not exist.
            return;
        };
        self.visited.insert(id.clone());

        let mut best = ScoreVec::for_node(node);
        for child in &node.children {
            self.visit(child);
            if self.store.contains(child) {
                self.parents
                    .entry(child.clone())
                    .or_default()
                    .push(id.clone());
            }
            // A child on the current DFS stack (cycle back-edge) has no
            // propagated vector yet; skip it rather than guess.
            if let Some(&child_vec) = self.propagated.get(child) {
                best = best.max(child_vec);
            }
        }

        self.propagated.insert(id.clone(), best);
        self.visit_order.push(id.clone());
    }
}
