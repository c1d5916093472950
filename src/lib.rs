//! # topograph
//!
//! A personal task/goal tracker rendered as an interactive dependency graph.
//! Nodes (tasks, goals, projects, problems) are connected with parent/child
//! edges; the engine derives one deterministic ordering of the whole graph
//! and keeps a dependent canvas synchronized with it as the data mutates.
//!
//! ## Architecture
//!
//! - **Graph store** (`graph`): immutable-update node map with pure mutation primitives
//! - **Toposorter** (`graph::toposort`): score-vector propagation and the Ordered View
//! - **State manager** (`manager`): async mutation API with persistence and commit barriers
//! - **Propagation queue** (`propagation`): FIFO register / flush-on-signal async barrier
//! - **Canvas controller** (`canvas`): downstream node/edge lists, layout, search
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use topograph::canvas::{CanvasController, RankLayout};
//! use topograph::manager::GraphStateManager;
//! use topograph::persist::MemoryStore;
//! use topograph::session::Session;
//!
//! # async fn demo() -> miette::Result<()> {
//! let manager = Arc::new(GraphStateManager::new(Arc::new(MemoryStore::new()))?);
//! let session = Arc::new(Session::new());
//! let canvas = Arc::new(CanvasController::new(
//!     Box::new(RankLayout::default()),
//!     Arc::clone(&session),
//!     manager.propagation(),
//! ));
//! tokio::spawn(Arc::clone(&canvas).run(manager.subscribe()));
//! let id = manager.add_node("water the plants").await?;
//! session.select(id);
//! canvas.layout_nodes_and_center_selected();
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod canvas;
pub mod command;
pub mod config;
pub mod error;
pub mod graph;
pub mod manager;
pub mod paths;
pub mod persist;
pub mod propagation;
pub mod session;
