//! Canvas controller: the downstream consumer of Ordered View snapshots.
//!
//! The canvas keeps its own node/edge lists, separate from the graph store.
//! On every state change it re-synchronizes: surviving nodes keep their
//! on-screen position but receive fresh data payloads, new nodes appear at a
//! placeholder position, vanished nodes are dropped, and edges are rebuilt
//! (duplicate edges stay duplicated — they render twice by design). After
//! each re-sync the controller signals `consume` on the propagation queue so
//! manager actions awaiting propagation can proceed.
//!
//! Position geometry itself is an external concern behind [`LayoutEngine`];
//! the bundled [`RankLayout`] is a plain left-to-right layered placement.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::graph::toposort::{OrderedView, SortedNode};
use crate::graph::{NodeId, edge_id};
use crate::propagation::PropagationQueue;
use crate::session::Session;

/// Canvas-space coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One node as the canvas sees it: derived payload plus screen position.
#[derive(Debug, Clone)]
pub struct CanvasNode {
    pub id: NodeId,
    pub data: SortedNode,
    pub position: Position,
}

/// One rendered edge. The id is the composite `"{from}--{to}"` form used by
/// edge deletion.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasEdge {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
}

/// Opaque layout service: consumes node/edge lists, returns one position per
/// node, in node order.
pub trait LayoutEngine: Send + Sync {
    fn layout(&self, nodes: &[CanvasNode], edges: &[CanvasEdge]) -> Vec<Position>;
}

/// Left-to-right layered placement: column = longest path from a root, row =
/// arrival order within the column. Good enough as a default; anything
/// fancier plugs in through [`LayoutEngine`].
#[derive(Debug, Clone)]
pub struct RankLayout {
    pub rank_sep: f64,
    pub node_sep: f64,
}

impl Default for RankLayout {
    fn default() -> Self {
        Self {
            rank_sep: 220.0,
            node_sep: 80.0,
        }
    }
}

impl LayoutEngine for RankLayout {
    fn layout(&self, nodes: &[CanvasNode], edges: &[CanvasEdge]) -> Vec<Position> {
        let mut children: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for edge in edges {
            children.entry(&edge.source).or_default().push(&edge.target);
        }

        // Depth = longest path from any root; a visited set truncates cycles
        // the same way graph traversal does.
        fn depth_of<'a>(
            id: &'a NodeId,
            children: &HashMap<&'a NodeId, Vec<&'a NodeId>>,
            memo: &mut HashMap<&'a NodeId, usize>,
            on_stack: &mut std::collections::HashSet<&'a NodeId>,
        ) -> usize {
            if let Some(&d) = memo.get(id) {
                return d;
            }
            if !on_stack.insert(id) {
                return 0;
            }
            let d = children
                .get(id)
                .into_iter()
                .flatten()
                .copied()
                .map(|child| depth_of(child, children, memo, on_stack) + 1)
                .max()
                .unwrap_or(0);
            on_stack.remove(id);
            memo.insert(id, d);
            d
        }

        let mut memo = HashMap::new();
        let mut on_stack = std::collections::HashSet::new();
        let mut rows: HashMap<usize, usize> = HashMap::new();
        nodes
            .iter()
            .map(|node| {
                // Deeper subtrees extend right; children sit left of parents.
                let depth = depth_of(&node.id, &children, &mut memo, &mut on_stack);
                let row = rows.entry(depth).or_insert(0);
                let position = Position {
                    x: -(depth as f64) * self.rank_sep,
                    y: (*row as f64) * self.node_sep,
                };
                *row += 1;
                position
            })
            .collect()
    }
}

/// Current view center, updated by `center`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub center: Position,
}

#[derive(Debug, Default)]
struct CanvasState {
    nodes: Vec<CanvasNode>,
    edges: Vec<CanvasEdge>,
    viewport: Viewport,
}

/// Downstream consumer of the graph state. Never mutates graph data itself;
/// structural changes always go back through the state manager.
pub struct CanvasController {
    state: Mutex<CanvasState>,
    layout: Box<dyn LayoutEngine>,
    session: Arc<Session>,
    queue: Arc<PropagationQueue>,
}

impl CanvasController {
    pub fn new(
        layout: Box<dyn LayoutEngine>,
        session: Arc<Session>,
        queue: Arc<PropagationQueue>,
    ) -> Self {
        Self {
            state: Mutex::new(CanvasState::default()),
            layout,
            session,
            queue,
        }
    }

    /// Consume Ordered View snapshots until the manager goes away.
    ///
    /// Syncs the seeded snapshot immediately, then once per change. Each
    /// sync ends with a `consume` signal, which is what lets awaited manager
    /// actions resolve.
    pub async fn run(self: Arc<Self>, mut updates: watch::Receiver<Arc<OrderedView>>) {
        let initial = Arc::clone(&updates.borrow_and_update());
        self.sync(&initial);
        while updates.changed().await.is_ok() {
            let view = Arc::clone(&updates.borrow_and_update());
            self.sync(&view);
        }
        tracing::debug!("canvas controller detached");
    }

    /// Re-synchronize canvas node/edge lists from one snapshot.
    pub fn sync(&self, view: &OrderedView) {
        {
            let mut state = self.state.lock();
            let old_positions: HashMap<NodeId, Position> = state
                .nodes
                .drain(..)
                .map(|node| (node.id, node.position))
                .collect();

            let mut nodes = Vec::with_capacity(view.len());
            let mut edges = Vec::new();
            for entry in view.iter() {
                nodes.push(CanvasNode {
                    id: entry.id.clone(),
                    data: entry.clone(),
                    position: old_positions
                        .get(&entry.id)
                        .copied()
                        .unwrap_or_default(),
                });
                for child in &entry.node.children {
                    edges.push(CanvasEdge {
                        id: edge_id(&entry.id, child),
                        source: entry.id.clone(),
                        target: child.clone(),
                    });
                }
            }
            state.nodes = nodes;
            state.edges = edges;
        }
        self.session.prune(|id| view.get(id).is_some());
        tracing::trace!(nodes = view.len(), "canvas re-synced");
        self.queue.consume();
    }

    /// Recompute positions through the layout service.
    pub fn layout_nodes(&self) {
        let mut state = self.state.lock();
        let positions = self.layout.layout(&state.nodes, &state.edges);
        for (node, position) in state.nodes.iter_mut().zip(positions) {
            node.position = position;
        }
    }

    /// Layout, then center the view on the selected node, if any.
    pub fn layout_nodes_and_center_selected(&self) {
        self.layout_nodes();
        if let Some(id) = self.session.selected() {
            self.center(&id);
        }
    }

    /// Center the viewport on one node. Unknown ids are ignored.
    pub fn center(&self, id: &NodeId) {
        let mut state = self.state.lock();
        if let Some(position) = state
            .nodes
            .iter()
            .find(|node| &node.id == id)
            .map(|node| node.position)
        {
            state.viewport.center = position;
        }
    }

    /// Case-insensitive substring search over node values, in view order.
    /// Queries shorter than three characters return nothing.
    pub fn find_nodes(&self, query: &str) -> Vec<CanvasNode> {
        if query.chars().count() < 3 {
            return Vec::new();
        }
        let needle = query.to_lowercase();
        self.state
            .lock()
            .nodes
            .iter()
            .filter(|node| node.data.node.value.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    pub fn nodes(&self) -> Vec<CanvasNode> {
        self.state.lock().nodes.clone()
    }

    pub fn edges(&self) -> Vec<CanvasEdge> {
        self.state.lock().edges.clone()
    }

    pub fn viewport(&self) -> Viewport {
        self.state.lock().viewport
    }
}

impl std::fmt::Debug for CanvasController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CanvasController")
            .field("nodes", &state.nodes.len())
            .field("edges", &state.edges.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphStore;

    fn controller() -> (CanvasController, Arc<PropagationQueue>, Arc<Session>) {
        let queue = Arc::new(PropagationQueue::new());
        let session = Arc::new(Session::new());
        let canvas = CanvasController::new(
            Box::new(RankLayout::default()),
            Arc::clone(&session),
            Arc::clone(&queue),
        );
        (canvas, queue, session)
    }

    fn three_node_store() -> (GraphStore, Vec<NodeId>) {
        let (store, a) = GraphStore::new().add_node("alpha task");
        let (store, b) = store.add_node("beta goal");
        let (store, c) = store.add_node("gamma");
        let store = store.add_edge(&a, &b).unwrap();
        (store, vec![a, b, c])
    }

    #[test]
    fn sync_builds_nodes_and_edges_in_view_order() {
        let (canvas, _, _) = controller();
        let (store, ids) = three_node_store();
        let view = OrderedView::derive(&store);

        canvas.sync(&view);
        let nodes = canvas.nodes();
        assert_eq!(nodes.len(), 3);
        for (node, entry) in nodes.iter().zip(view.iter()) {
            assert_eq!(node.id, entry.id);
        }
        assert_eq!(
            canvas.edges(),
            vec![CanvasEdge {
                id: edge_id(&ids[0], &ids[1]),
                source: ids[0].clone(),
                target: ids[1].clone(),
            }]
        );
    }

    #[test]
    fn sync_signals_consume() {
        let (canvas, queue, _) = controller();
        let _pending = queue.wait_on_consume();
        assert_eq!(queue.pending(), 1);
        canvas.sync(&OrderedView::default());
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn resync_keeps_positions_and_refreshes_data() {
        let (canvas, _, _) = controller();
        let (store, ids) = three_node_store();
        canvas.sync(&OrderedView::derive(&store));
        canvas.layout_nodes();
        let placed: HashMap<NodeId, Position> = canvas
            .nodes()
            .into_iter()
            .map(|n| (n.id, n.position))
            .collect();

        let store = store.set_value(&ids[0], "renamed").unwrap();
        canvas.sync(&OrderedView::derive(&store));

        for node in canvas.nodes() {
            assert_eq!(node.position, placed[&node.id], "position survives sync");
        }
        let renamed = canvas
            .nodes()
            .into_iter()
            .find(|n| n.id == ids[0])
            .unwrap();
        assert_eq!(renamed.data.node.value, "renamed");
    }

    #[test]
    fn vanished_nodes_are_dropped_and_new_ones_placed_at_origin() {
        let (canvas, _, _) = controller();
        let (store, ids) = three_node_store();
        canvas.sync(&OrderedView::derive(&store));
        canvas.layout_nodes();

        let store = store.delete_node(&ids[2]).unwrap();
        let (store, fresh) = store.add_node("fresh");
        canvas.sync(&OrderedView::derive(&store));

        let nodes = canvas.nodes();
        assert!(nodes.iter().all(|n| n.id != ids[2]));
        let new_node = nodes.iter().find(|n| n.id == fresh).unwrap();
        assert_eq!(new_node.position, Position::default());
    }

    #[test]
    fn duplicate_edges_render_twice() {
        let (canvas, _, _) = controller();
        let (store, a) = GraphStore::new().add_node("a");
        let (store, b) = store.add_node("b");
        let store = store.add_edge(&a, &b).unwrap();
        let store = store.add_edge(&a, &b).unwrap();

        canvas.sync(&OrderedView::derive(&store));
        assert_eq!(canvas.edges().len(), 2);
    }

    #[test]
    fn find_nodes_minimum_query_length() {
        let (canvas, _, _) = controller();
        let (store, _) = three_node_store();
        canvas.sync(&OrderedView::derive(&store));

        assert!(canvas.find_nodes("al").is_empty());
        let hits = canvas.find_nodes("ALPHA");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].data.node.value, "alpha task");
    }

    #[test]
    fn center_moves_viewport_to_selected() {
        let (canvas, _, session) = controller();
        let (store, ids) = three_node_store();
        canvas.sync(&OrderedView::derive(&store));
        canvas.layout_nodes();

        session.select(ids[1].clone());
        canvas.layout_nodes_and_center_selected();
        let target = canvas
            .nodes()
            .into_iter()
            .find(|n| n.id == ids[1])
            .unwrap();
        assert_eq!(canvas.viewport().center, target.position);
    }

    #[test]
    fn sync_prunes_session_references() {
        let (canvas, _, session) = controller();
        let (store, ids) = three_node_store();
        canvas.sync(&OrderedView::derive(&store));
        session.select(ids[2].clone());

        let store = store.delete_node(&ids[2]).unwrap();
        canvas.sync(&OrderedView::derive(&store));
        assert_eq!(session.selected(), None);
    }

    #[test]
    fn rank_layout_separates_ranks() {
        let (canvas, _, _) = controller();
        let (store, ids) = three_node_store();
        canvas.sync(&OrderedView::derive(&store));
        canvas.layout_nodes();

        let by_id: HashMap<NodeId, Position> = canvas
            .nodes()
            .into_iter()
            .map(|n| (n.id, n.position))
            .collect();
        // Parent (a) has depth 1, child (b) depth 0: different columns.
        assert_ne!(by_id[&ids[0]].x, by_id[&ids[1]].x);
    }
}
