//! In-process pub/sub so the daemon supervisor can react to mutations
//! without polling the database.
//!
//! `SqliteStorage::mutate` publishes a [`ChangeEvent`] to every registered
//! listener immediately after `tx.commit()` succeeds -- never before, and
//! never if the transaction rolled back. Listeners run synchronously on
//! the caller's thread, so they must be cheap; the daemon's listener just
//! pokes a debouncer's condvar and returns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// What changed, as reported by a single `mutate()` call.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Name of the mutating operation (`"create_issue"`, `"update_issue"`, ...).
    pub op: String,
    /// Actor that performed the mutation.
    pub actor: String,
    /// Issue ids touched by the mutation (the same set marked dirty for export).
    pub dirty_ids: Vec<String>,
}

/// Anything that wants to be told about committed mutations.
pub trait ChangeListener: Send + Sync {
    /// Called once per committed `mutate()`, on the committing thread.
    fn on_change(&self, event: &ChangeEvent);
}

impl<F> ChangeListener for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent) {
        self(event);
    }
}

struct Entry {
    id: u64,
    listener: Arc<dyn ChangeListener>,
}

/// Owns the list of subscribers for one [`crate::storage::SqliteStorage`].
#[derive(Default, Clone)]
pub struct ChangeBus {
    entries: Arc<Mutex<Vec<Entry>>>,
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.entries.lock().map(|e| e.len()).unwrap_or(0);
        f.debug_struct("ChangeBus").field("listeners", &count).finish()
    }
}

impl ChangeBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Dropping the returned [`ChangeSubscription`]
    /// unregisters it; there is no other way to stop receiving events.
    pub fn subscribe(&self, listener: impl ChangeListener + 'static) -> ChangeSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let listener: Arc<dyn ChangeListener> = Arc::new(listener);
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(Entry { id, listener });
        }
        ChangeSubscription {
            id,
            bus: Arc::downgrade(&self.entries),
        }
    }

    /// Publish to every live listener, in subscription order.
    ///
    /// Must only be called after a successful commit.
    pub fn publish(&self, event: &ChangeEvent) {
        let Ok(entries) = self.entries.lock() else {
            return;
        };
        for entry in entries.iter() {
            entry.listener.on_change(event);
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

/// Handle returned by [`ChangeBus::subscribe`]. Unsubscribes on drop.
pub struct ChangeSubscription {
    id: u64,
    bus: Weak<Mutex<Vec<Entry>>>,
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Some(entries) = self.bus.upgrade() {
            if let Ok(mut entries) = entries.lock() {
                entries.retain(|e| e.id != self.id);
            }
        }
    }
}
