//! Change notification channel.
//!
//! Signals that the record for a (logical key, identity) pair changed because a
//! remote update was applied. Handlers run synchronously on the notifying
//! thread; async consumers can [`ChangeBus::listen`] instead. Nothing is
//! persisted, so late subscribers never see earlier events.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;

/// Capacity of the async listener channel. Lagging listeners lose old events.
const LISTENER_CAPACITY: usize = 256;

/// A record changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ChangeEvent {
    #[serde(rename = "baseKey")]
    pub logical_key: String,
    pub identity: String,
}

impl ChangeEvent {
    pub fn new(logical_key: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            logical_key: logical_key.into(),
            identity: identity.into(),
        }
    }

    /// Whether this event concerns `logical_key` under `identity`.
    pub fn is_for(&self, logical_key: &str, identity: &str) -> bool {
        self.logical_key == logical_key && self.identity == identity
    }
}

type Handler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

struct BusInner {
    handlers: Mutex<BTreeMap<u64, Handler>>,
    next_id: AtomicU64,
    listeners: broadcast::Sender<ChangeEvent>,
}

/// Publish/subscribe bus for [`ChangeEvent`]s. Clones share one bus.
#[derive(Clone)]
pub struct ChangeBus {
    inner: Arc<BusInner>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeBus {
    pub fn new() -> Self {
        let (listeners, _) = broadcast::channel(LISTENER_CAPACITY);
        Self {
            inner: Arc::new(BusInner {
                handlers: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(0),
                listeners,
            }),
        }
    }

    /// Register a handler. It stays registered until the returned
    /// [`Subscription`] is unsubscribed or dropped.
    #[must_use = "dropping the subscription unsubscribes the handler"]
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::new(handler));
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Receive events asynchronously.
    pub fn listen(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.listeners.subscribe()
    }

    /// Deliver `event` to every handler and listener.
    pub fn notify(&self, event: ChangeEvent) {
        // Snapshot so handlers may (un)subscribe while being called.
        let handlers: Vec<Handler> = self
            .inner
            .handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        for handler in handlers {
            handler(&event);
        }
        let _ = self.inner.listeners.send(event);
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.inner
            .handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl std::fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBus")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

/// Handle for a registered handler.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Deregister the handler.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            inner
                .handlers
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&self.id);
        }
    }
}
