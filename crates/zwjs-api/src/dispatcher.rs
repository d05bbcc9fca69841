//! Fan-out of server push events to registered listeners.
//!
//! The subscriber list is copy-on-write behind an [`ArcSwap`]: dispatch
//! iterates an immutable snapshot, so listeners can subscribe or
//! unsubscribe (themselves included) from inside `on_event` without
//! deadlocking the reader.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::codec::EventMessage;

/// Receives every event the server pushes.
///
/// Called on the connection's reader task. Implementations must return
/// quickly; hand heavy work off to a channel or a spawned task.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &EventMessage);
}

impl<F> EventListener for F
where
    F: Fn(&EventMessage) + Send + Sync,
{
    fn on_event(&self, event: &EventMessage) {
        self(event);
    }
}

type Subscribers = Vec<Arc<dyn EventListener>>;

/// Ordered, duplicate-free set of event listeners.
pub struct EventDispatcher {
    subscribers: ArcSwap<Subscribers>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            subscribers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Add a listener. Returns `false` if it was already subscribed.
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> bool {
        let mut added = false;
        self.subscribers.rcu(|current| {
            if current.iter().any(|l| same_listener(l, &listener)) {
                added = false;
                Arc::clone(current)
            } else {
                added = true;
                let mut next = Subscribers::clone(current);
                next.push(Arc::clone(&listener));
                Arc::new(next)
            }
        });
        added
    }

    /// Remove a listener. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, listener: &Arc<dyn EventListener>) -> bool {
        let mut removed = false;
        self.subscribers.rcu(|current| {
            let next: Subscribers = current
                .iter()
                .filter(|l| !same_listener(l, listener))
                .cloned()
                .collect();
            removed = next.len() != current.len();
            next
        });
        removed
    }

    /// Deliver `event` to every listener subscribed when dispatch began,
    /// in registration order. Returns the number of listeners reached.
    ///
    /// A panicking listener is logged and skipped; the rest still run.
    /// This needs `panic = "unwind"`: under `panic = "abort"` a listener
    /// panic ends the process.
    pub fn dispatch(&self, event: &EventMessage) -> usize {
        let snapshot = self.subscribers.load_full();
        for listener in snapshot.iter() {
            if catch_unwind(AssertUnwindSafe(|| listener.on_event(event))).is_err() {
                tracing::warn!(
                    source = %event.source,
                    event = %event.event,
                    "event listener panicked"
                );
            }
        }
        snapshot.len()
    }

    pub fn len(&self) -> usize {
        self.subscribers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn same_listener(a: &Arc<dyn EventListener>, b: &Arc<dyn EventListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// ── Tests ────────────────────────────────────────────────────────────
