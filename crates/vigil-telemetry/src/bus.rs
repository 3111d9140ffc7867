//! Snapshot fan-out to observers
//!
//! Two delivery paths share one publish call:
//! - synchronous callbacks registered with [`SubscriptionBus::subscribe`],
//!   invoked once per published snapshot on the publishing task
//! - a `watch` channel holding the latest snapshot, read by
//!   [`SubscriptionBus::latest`] and awaited by async consumers (bursts
//!   coalesce to the newest value)
//!
//! The callback list is copied under the lock and callbacks run without it,
//! so a callback may subscribe or unsubscribe without deadlocking.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::snapshot::AggregateSnapshot;

/// Observer callback
pub type SnapshotCallback = Arc<dyn Fn(Arc<AggregateSnapshot>) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    callbacks: Vec<(u64, SnapshotCallback)>,
}

impl Registry {
    fn remove(&mut self, id: u64) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(existing, _)| *existing != id);
        self.callbacks.len() != before
    }
}

/// Publisher side of the snapshot fan-out
#[derive(Clone)]
pub struct SubscriptionBus {
    registry: Arc<Mutex<Registry>>,
    latest: Arc<watch::Sender<Arc<AggregateSnapshot>>>,
}

impl std::fmt::Debug for SubscriptionBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl SubscriptionBus {
    /// Create a bus seeded with an initial snapshot
    pub fn new(initial: Arc<AggregateSnapshot>) -> Self {
        let (latest, _) = watch::channel(initial);
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            latest: Arc::new(latest),
        }
    }

    /// Register a callback invoked with every published snapshot
    ///
    /// The callback stays registered until the returned guard is dropped or
    /// [`Subscription::unsubscribe`] is called.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Arc<AggregateSnapshot>) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.callbacks.push((id, Arc::new(callback)));
        debug!("Subscriber {} registered", id);

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Store `snapshot` as the latest value and notify every subscriber
    pub fn publish(&self, snapshot: Arc<AggregateSnapshot>) {
        self.latest.send_replace(Arc::clone(&snapshot));

        let callbacks: Vec<(u64, SnapshotCallback)> = self.lock().callbacks.clone();
        for (id, callback) in callbacks {
            let snapshot = Arc::clone(&snapshot);
            let result = catch_unwind(AssertUnwindSafe(|| callback(snapshot)));
            if result.is_err() {
                warn!("Subscriber {} panicked during notification", id);
            }
        }
    }

    /// Latest published snapshot
    pub fn latest(&self) -> Arc<AggregateSnapshot> {
        Arc::clone(&self.latest.borrow())
    }

    /// Receiver that observes every published snapshot (coalescing)
    pub fn watch(&self) -> watch::Receiver<Arc<AggregateSnapshot>> {
        self.latest.subscribe()
    }

    /// Number of registered callbacks
    pub fn subscriber_count(&self) -> usize {
        self.lock().callbacks.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        // A panicking callback never holds this lock, but recover regardless
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registration guard returned by [`SubscriptionBus::subscribe`]
///
/// Dropping the guard deregisters the callback.
#[derive(Debug)]
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Deregister the callback
    pub fn unsubscribe(self) {
        // Drop does the work
    }

    fn release(&self) {
        if let Some(registry) = self.registry.upgrade() {
            let removed = registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(self.id);
            if removed {
                debug!("Subscriber {} removed", self.id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
