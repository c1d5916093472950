//! Propagation queue: a single-consumer async barrier between a state
//! commit and its observable downstream effect.
//!
//! Callers register with [`PropagationQueue::wait_on_consume`] and receive a
//! future that resolves exactly once, on the next [`PropagationQueue::consume`]
//! call after registration — never retroactively for signals that already
//! happened. The canvas controller signals `consume` after each re-sync, so
//! a multi-step action ("add node, select it, lay out, center") can run each
//! step only after the previous step's effect has actually landed.
//!
//! There is no timeout: if nothing ever consumes (e.g. no canvas is
//! attached), waiters hang. That is a documented limitation, not a defect.

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// FIFO set of pending wakeups, flushed together on each `consume`.
#[derive(Debug, Default)]
pub struct PropagationQueue {
    waiters: Mutex<Vec<oneshot::Sender<()>>>,
}

impl PropagationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for the next `consume` signal.
    ///
    /// Registration happens synchronously, before the returned future is
    /// polled, so a caller can register and then trigger the work that will
    /// eventually consume without racing itself.
    pub fn wait_on_consume(&self) -> impl std::future::Future<Output = ()> + Send + use<> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().push(tx);
        async move {
            // The sender lives in the queue until a consume drains it, so an
            // Err here only means the queue itself was dropped.
            let _ = rx.await;
        }
    }

    /// Flush every registered waiter. Returns how many were woken.
    pub fn consume(&self) -> usize {
        let drained: Vec<_> = std::mem::take(&mut *self.waiters.lock());
        let count = drained.len();
        for waiter in drained {
            let _ = waiter.send(());
        }
        if count > 0 {
            tracing::trace!(waiters = count, "propagation consumed");
        }
        count
    }

    /// Number of callers currently awaiting a consume signal.
    pub fn pending(&self) -> usize {
        self.waiters.lock().len()
    }
}
