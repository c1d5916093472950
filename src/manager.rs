//! Graph state manager: the externally callable mutation API.
//!
//! Wraps the pure store primitives with re-derivation of the Ordered View,
//! persistence, and the commit barrier: every action is async and resolves
//! only after the new state has been committed *and* a downstream consumer
//! (normally the canvas controller) has signalled one re-sync through the
//! propagation queue.
//!
//! The store is single-writer: only this manager replaces it. Readers get
//! cheap `Arc` snapshots of the current Ordered View, so no locking is held
//! across await points.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{GraphError, TopoError, TopoResult};
use crate::graph::toposort::OrderedView;
use crate::graph::{Direction, GraphStore, NodeId, NodeKind};
use crate::persist::{self, KvStore};
use crate::propagation::PropagationQueue;

struct Inner {
    store: GraphStore,
    view: Arc<OrderedView>,
}

/// Single-writer owner of the graph store.
///
/// Construct once, share via `Arc`; attach a canvas controller (or any other
/// consumer) to [`GraphStateManager::subscribe`] so actions can complete.
pub struct GraphStateManager {
    inner: Mutex<Inner>,
    kv: Arc<dyn KvStore>,
    queue: Arc<PropagationQueue>,
    updates: watch::Sender<Arc<OrderedView>>,
}

impl GraphStateManager {
    /// Load the persisted store (empty on first run) and derive its view.
    pub fn new(kv: Arc<dyn KvStore>) -> TopoResult<Self> {
        let store = persist::load_graph(kv.as_ref())?;
        let view = Arc::new(OrderedView::derive(&store));
        tracing::info!(nodes = store.len(), "graph state loaded");
        let (updates, _) = watch::channel(Arc::clone(&view));
        Ok(Self {
            inner: Mutex::new(Inner { store, view }),
            kv,
            queue: Arc::new(PropagationQueue::new()),
            updates,
        })
    }

    /// The propagation queue consumers signal after each re-sync.
    pub fn propagation(&self) -> Arc<PropagationQueue> {
        Arc::clone(&self.queue)
    }

    /// Subscribe to Ordered View snapshots. The receiver is seeded with the
    /// current view.
    pub fn subscribe(&self) -> watch::Receiver<Arc<OrderedView>> {
        self.updates.subscribe()
    }

    /// Current Ordered View snapshot.
    pub fn view(&self) -> Arc<OrderedView> {
        Arc::clone(&self.inner.lock().view)
    }

    /// Copy of the raw store (tests, export).
    pub fn store(&self) -> GraphStore {
        self.inner.lock().store.clone()
    }

    /// Resolve a short unambiguous id prefix against the current store.
    pub fn reconcile_id(&self, prefix: &str) -> Result<NodeId, GraphError> {
        self.inner.lock().store.reconcile_id(prefix)
    }

    /// Insert a node with the given display value.
    pub async fn add_node(&self, value: impl Into<String>) -> TopoResult<NodeId> {
        let (next, id) = self.inner.lock().store.add_node(value);
        self.commit(next).await?;
        Ok(id)
    }

    /// Insert an empty node connected to the node matching `anchor_prefix`.
    pub async fn add_linked_node(
        &self,
        anchor_prefix: &str,
        direction: Direction,
    ) -> TopoResult<NodeId> {
        let (next, id) = {
            let inner = self.inner.lock();
            let anchor = inner.store.reconcile_id(anchor_prefix)?;
            inner.store.add_node_with_connection(&anchor, direction)
        };
        self.commit(next).await?;
        Ok(id)
    }

    /// Delete the node matching `prefix`, pruning every edge to it.
    pub async fn delete_node(&self, prefix: &str) -> TopoResult<()> {
        let next = {
            let inner = self.inner.lock();
            let id = inner.store.reconcile_id(prefix)?;
            inner.store.delete_node(&id)?
        };
        self.commit(next).await
    }

    /// Append an edge from one resolved prefix to another.
    pub async fn add_edge(&self, from_prefix: &str, to_prefix: &str) -> TopoResult<String> {
        let (next, edge) = {
            let inner = self.inner.lock();
            let from = inner.store.reconcile_id(from_prefix)?;
            let to = inner.store.reconcile_id(to_prefix)?;
            (
                inner.store.add_edge(&from, &to)?,
                crate::graph::edge_id(&from, &to),
            )
        };
        self.commit(next).await?;
        Ok(edge)
    }

    /// Delete one edge by its composite `"{fromId}--{toId}"` id.
    pub async fn delete_edge(&self, composite: &str) -> TopoResult<()> {
        let next = self.inner.lock().store.delete_edge(composite)?;
        self.commit(next).await
    }

    /// Set or clear the status of the node matching `prefix`.
    pub async fn set_status(&self, prefix: &str, raw_status: &str) -> TopoResult<NodeId> {
        self.mutate_resolved(prefix, |store, id| store.set_status(id, raw_status))
            .await
    }

    /// Set the priority of the node matching `prefix`. A no-op change
    /// aborts internally and resolves without touching persistence.
    pub async fn set_priority(&self, prefix: &str, priority: u8) -> TopoResult<NodeId> {
        self.mutate_resolved(prefix, |store, id| store.set_priority(id, priority))
            .await
    }

    /// Set the type of the node matching `prefix`.
    pub async fn set_kind(&self, prefix: &str, kind: NodeKind) -> TopoResult<NodeId> {
        self.mutate_resolved(prefix, |store, id| store.set_kind(id, kind))
            .await
    }

    /// Replace the display value of the node matching `prefix`. A no-op
    /// change aborts internally and resolves without touching persistence.
    pub async fn set_value(&self, prefix: &str, value: &str) -> TopoResult<NodeId> {
        self.mutate_resolved(prefix, |store, id| store.set_value(id, value))
            .await
    }

    /// Replace the notes of the node matching `prefix`.
    pub async fn set_notes(&self, prefix: &str, notes: &str) -> TopoResult<NodeId> {
        self.mutate_resolved(prefix, |store, id| store.set_notes(id, notes))
            .await
    }

    /// Pin or unpin the node matching `prefix`.
    pub async fn set_pinned(&self, prefix: &str, pinned: bool) -> TopoResult<NodeId> {
        self.mutate_resolved(prefix, |store, id| store.set_pinned(id, pinned))
            .await
    }

    /// Replace the effort estimate of the node matching `prefix`.
    pub async fn set_estimate(&self, prefix: &str, estimate: f64) -> TopoResult<NodeId> {
        self.mutate_resolved(prefix, |store, id| store.set_estimate(id, estimate))
            .await
    }

    /// Copy the persisted graph document to a timestamped backup key.
    pub fn backup(&self) -> TopoResult<Option<String>> {
        Ok(persist::backup_graph(self.kv.as_ref())?)
    }

    /// Resolve `prefix` once, apply a pure mutation, commit. Returns the
    /// resolved id so callers do not have to reconcile a second time.
    async fn mutate_resolved(
        &self,
        prefix: &str,
        apply: impl FnOnce(&GraphStore, &NodeId) -> Result<GraphStore, GraphError>,
    ) -> TopoResult<NodeId> {
        let (next, id) = {
            let inner = self.inner.lock();
            let id = inner.store.reconcile_id(prefix)?;
            match apply(&inner.store, &id) {
                Ok(next) => (next, id),
                Err(GraphError::Aborted) => {
                    // No-op mutation: skip persistence and notification, but
                    // resolve the caller normally. Not an error path.
                    tracing::debug!(id = %id, "mutation aborted (no-op)");
                    return Ok(id);
                }
                Err(e) => return Err(TopoError::Graph(e)),
            }
        };
        self.commit(next).await?;
        Ok(id)
    }

    /// Persist and publish a new store, then wait for one downstream
    /// re-sync. The commit (derive + persist + publish) is synchronous and
    /// atomic within one turn; only the barrier awaits.
    async fn commit(&self, next: GraphStore) -> TopoResult<()> {
        let view = Arc::new(OrderedView::derive(&next));
        persist::save_graph(self.kv.as_ref(), &next)?;
        {
            let mut inner = self.inner.lock();
            inner.store = next;
            inner.view = Arc::clone(&view);
        }
        // Register before publishing so the consumer's consume cannot slip
        // between the two.
        let wait = self.queue.wait_on_consume();
        let _ = self.updates.send(Arc::clone(&view));
        tracing::debug!(nodes = view.len(), "state committed, awaiting propagation");
        wait.await;
        Ok(())
    }
}

impl std::fmt::Debug for GraphStateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStateManager")
            .field("nodes", &self.inner.lock().store.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryStore;
    use tokio::sync::watch::Receiver;

    /// Headless stand-in for the canvas: acknowledges every published view
    /// so manager actions can resolve.
    fn ack_loop(
        mut rx: Receiver<Arc<OrderedView>>,
        queue: Arc<PropagationQueue>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                queue.consume();
            }
        })
    }

    fn manager() -> Arc<GraphStateManager> {
        Arc::new(GraphStateManager::new(Arc::new(MemoryStore::new())).unwrap())
    }

    #[tokio::test]
    async fn add_node_resolves_after_consume() {
        let manager = manager();
        let _ack = ack_loop(manager.subscribe(), manager.propagation());

        let id = manager.add_node("first").await.unwrap();
        let view = manager.view();
        assert_eq!(view.len(), 1);
        assert_eq!(view.get(&id).unwrap().node.value, "first");
    }

    #[tokio::test]
    async fn action_does_not_resolve_without_consumer() {
        let manager = manager();
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(30),
            manager.add_node("stuck"),
        )
        .await;
        assert!(result.is_err(), "action must block until a consume signal");
        // The mutation itself was committed before the barrier.
        assert_eq!(manager.view().len(), 1);
    }

    #[tokio::test]
    async fn aborted_mutation_skips_commit_and_resolves() {
        let kv = Arc::new(MemoryStore::new());
        let manager =
            Arc::new(GraphStateManager::new(Arc::clone(&kv) as Arc<dyn KvStore>).unwrap());
        let ack = ack_loop(manager.subscribe(), manager.propagation());

        let id = manager.add_node("same").await.unwrap();
        let before = kv.get(persist::GRAPH_STATE_KEY).unwrap().unwrap();

        // Detach the consumer entirely: an aborted action must still resolve
        // because it never registers a waiter.
        ack.abort();
        tokio::time::timeout(
            std::time::Duration::from_millis(100),
            manager.set_value(&id.to_string(), "same"),
        )
        .await
        .expect("abort resolves without a consumer")
        .expect("abort resolves normally");

        // Nothing was persisted or notified: bytes are untouched and no
        // backup or extra key appeared.
        assert_eq!(
            kv.get(persist::GRAPH_STATE_KEY).unwrap().unwrap(),
            before
        );
        assert_eq!(kv.keys(), vec![persist::GRAPH_STATE_KEY.to_string()]);
    }

    #[tokio::test]
    async fn failed_action_leaves_state_untouched() {
        let manager = manager();
        let _ack = ack_loop(manager.subscribe(), manager.propagation());

        let id = manager.add_node("keep").await.unwrap();
        let before = manager.store();

        let err = manager.set_status(&id.to_string(), "bogus").await;
        assert!(err.is_err());
        assert_eq!(manager.store(), before);

        let err = manager.delete_node("zzz").await;
        assert!(err.is_err());
        assert_eq!(manager.store(), before);
    }

    #[tokio::test]
    async fn linked_add_and_edge_lifecycle() {
        let manager = manager();
        let _ack = ack_loop(manager.subscribe(), manager.propagation());

        let parent = manager.add_node("parent").await.unwrap();
        let child = manager
            .add_linked_node(&parent.to_string(), Direction::Child)
            .await
            .unwrap();

        let store = manager.store();
        assert_eq!(store.get(&parent).unwrap().children, vec![child.clone()]);

        let edge = crate::graph::edge_id(&parent, &child);
        manager.delete_edge(&edge).await.unwrap();
        assert!(manager.store().get(&parent).unwrap().children.is_empty());
    }

    #[tokio::test]
    async fn setters_resolve_the_prefix_once_and_return_the_id() {
        let manager = manager();
        let _ack = ack_loop(manager.subscribe(), manager.propagation());

        let id = manager.add_node("target").await.unwrap();
        let resolved = manager.set_pinned(id.short(), true).await.unwrap();
        assert_eq!(resolved, id);
        assert!(manager.view().get(&id).unwrap().node.is_pinned());
    }

    #[tokio::test]
    async fn reconcile_rejects_ambiguous_and_missing() {
        let manager = manager();
        let _ack = ack_loop(manager.subscribe(), manager.propagation());

        manager.add_node("a").await.unwrap();
        manager.add_node("b").await.unwrap();

        // Every UUID shares the empty prefix.
        assert!(matches!(
            manager.reconcile_id(""),
            Err(GraphError::AmbiguousPrefix { .. })
        ));
        assert!(matches!(
            manager.reconcile_id("this-matches-nothing"),
            Err(GraphError::NotFound { .. })
        ));
    }
}
