//! Change notification bus
//!
//! Each `TableModel` owns one bus. Listeners are held weakly so a dropped view
//! never keeps the model alive or receives events; dead entries are pruned on
//! the next publish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dbgrid_core::TableSnapshot;
use parking_lot::Mutex;

/// What a single model mutation did
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    /// Columns and rows were replaced wholesale
    Replaced,
    /// Cells of the row at `index` changed in place
    RowUpdated { index: usize },
    /// A row was appended at `index`
    RowAppended { index: usize },
    /// Rows were inserted; `indices` are their final positions, ascending
    RowsInserted { indices: Vec<usize> },
    /// Rows were removed; `indices` are their pre-removal positions, ascending
    RowsRemoved { indices: Vec<usize> },
    /// A remote write failed and its optimistic change was rolled back.
    /// The snapshot is unchanged by this event itself.
    WriteRejected { operation: String, message: String },
}

/// Payload delivered to every listener after a mutation
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Model revision after the mutation
    pub revision: u64,
    pub kind: ChangeKind,
    /// The snapshot as it is after the mutation
    pub snapshot: Arc<TableSnapshot>,
}

/// Receiver of model change events.
///
/// Called synchronously on the mutating thread. Implementations must not
/// mutate the model they are subscribed to; such a call fails with
/// `ReentrantMutation`.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, event: &ChangeEvent);
}

impl<F> ChangeListener for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent) {
        self(event)
    }
}

/// Handle returned by [`ChangeBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscriber set owned by a single model
#[derive(Default)]
pub struct ChangeBus {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionId, Weak<dyn ChangeListener>)>>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<L>(&self, listener: &Arc<L>) -> SubscriptionId
    where
        L: ChangeListener + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let weak = Arc::downgrade(listener);
        let weak: Weak<dyn ChangeListener> = weak;
        self.subscribers.lock().push((id, weak));
        tracing::trace!(subscription = id.0, "Listener subscribed");
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn clear(&self) {
        self.subscribers.lock().clear();
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    /// Deliver `event` to every live listener.
    ///
    /// The subscriber lock is released before any listener runs, so listeners
    /// may subscribe or unsubscribe from inside `on_change`.
    pub fn publish(&self, event: &ChangeEvent) {
        let listeners: Vec<Arc<dyn ChangeListener>> = {
            let mut subscribers = self.subscribers.lock();
            subscribers.retain(|(_, weak)| weak.strong_count() > 0);
            subscribers
                .iter()
                .filter_map(|(_, weak)| weak.upgrade())
                .collect()
        };

        tracing::trace!(
            revision = event.revision,
            listeners = listeners.len(),
            "Publishing change event"
        );

        for listener in listeners {
            listener.on_change(event);
        }
    }
}
