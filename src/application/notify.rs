//! "Parameters updated" notifications.
//!
//! Listeners receive the full parameter snapshot after a capture batch has
//! stored at least one recognized parameter.

use crate::domain::parameter::UtmSnapshot;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Callback receiving the parameter snapshot.
pub type UpdateListener = Arc<dyn Fn(&UtmSnapshot) + Send + Sync + 'static>;

/// Handle returned by [`Notifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Fan-out of update notifications to registered listeners.
#[derive(Default)]
pub struct Notifier {
    listeners: RwLock<Vec<(SubscriptionId, UpdateListener)>>,
    next_id: AtomicU64,
}

impl Notifier {
    /// Create a notifier with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn subscribe(&self, listener: UpdateListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Get the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `snapshot` to every listener.
    ///
    /// A panicking listener is logged and does not stop delivery to the rest.
    pub fn notify(&self, snapshot: &UtmSnapshot) {
        // Clone the list so listeners may (un)subscribe re-entrantly
        let listeners: Vec<(SubscriptionId, UpdateListener)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, listener) in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(snapshot))).is_err() {
                tracing::warn!(subscription = ?id, "update listener panicked");
            }
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}
