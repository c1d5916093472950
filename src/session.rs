//! Application session state: selection, highlights, hidden nodes, and the
//! command-line focus target.
//!
//! Several independent pieces of UI-adjacent state need to be reachable from
//! many call sites. Rather than ambient globals, this is one explicit struct
//! passed by reference (`Arc<Session>`), exposing narrow mutator methods
//! instead of raw setters.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::graph::NodeId;

/// Where keyboard focus should land after an action completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusTarget {
    /// The command-line input.
    CommandLine,
    /// The title/value editor of the selected node.
    Title,
}

#[derive(Debug, Default)]
struct SessionState {
    selected: Option<NodeId>,
    relevant: HashSet<NodeId>,
    hidden: HashSet<NodeId>,
    focus: Option<FocusTarget>,
}

/// Shared session state for one running app instance.
#[derive(Debug, Default)]
pub struct Session {
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&self, id: NodeId) {
        self.state.lock().selected = Some(id);
    }

    pub fn clear_selection(&self) {
        self.state.lock().selected = None;
    }

    pub fn selected(&self) -> Option<NodeId> {
        self.state.lock().selected.clone()
    }

    /// Replace the relevant-node highlight set (e.g. search results).
    pub fn set_relevant(&self, ids: impl IntoIterator<Item = NodeId>) {
        self.state.lock().relevant = ids.into_iter().collect();
    }

    pub fn clear_relevant(&self) {
        self.state.lock().relevant.clear();
    }

    pub fn relevant(&self) -> HashSet<NodeId> {
        self.state.lock().relevant.clone()
    }

    pub fn hide(&self, id: NodeId) {
        self.state.lock().hidden.insert(id);
    }

    /// Un-hide one node.
    pub fn show(&self, id: &NodeId) {
        self.state.lock().hidden.remove(id);
    }

    pub fn show_all(&self) {
        self.state.lock().hidden.clear();
    }

    pub fn is_hidden(&self, id: &NodeId) -> bool {
        self.state.lock().hidden.contains(id)
    }

    pub fn hidden(&self) -> HashSet<NodeId> {
        self.state.lock().hidden.clone()
    }

    /// Request focus for a UI target; the renderer takes it on its next turn.
    pub fn request_focus(&self, target: FocusTarget) {
        self.state.lock().focus = Some(target);
    }

    /// Consume the pending focus request, if any.
    pub fn take_focus(&self) -> Option<FocusTarget> {
        self.state.lock().focus.take()
    }

    /// Drop selection/highlight references to nodes that no longer exist.
    pub fn prune(&self, exists: impl Fn(&NodeId) -> bool) {
        let mut state = self.state.lock();
        if let Some(selected) = &state.selected {
            if !exists(selected) {
                state.selected = None;
            }
        }
        state.relevant.retain(|id| exists(id));
        state.hidden.retain(|id| exists(id));
    }
}
