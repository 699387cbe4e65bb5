//! Peer replication: the synchronized state store.
//!
//! # Protocol
//!
//! Last-write-wins on per-record wall-clock timestamps. No consensus, no
//! causal ordering, no acknowledgements.
//!
//! ```text
//! local write          save_raw ─→ LocalStore ─→ MetaTracker.bump(ts) ─→ overlay.put({ts, value})
//! remote update        overlay ─→ apply_envelope ─┬─ ts <= meta  → drop (stale / echo / tie)
//!                                                 └─ ts >  meta  → LocalStore, bump, ChangeEvent
//! start(key, id)       subscribe ─→ bootstrap: local record but meta == 0 → publish it
//! ```
//!
//! Equal timestamps are stale: the first value seen for a timestamp wins in
//! this process. Two peers seeing different envelopes first on an exact tie
//! can disagree; there is no secondary tie-break.

use crate::chunk::ChunkStore;
use crate::clock::{Clock, SystemClock};
use crate::config::DEFAULT_ROOT;
use crate::envelope::Envelope;
use crate::keys::LogicalKey;
use crate::meta::MetaTracker;
use crate::migrate::Migrator;
use crate::notify::{ChangeBus, ChangeEvent};
use crate::overlay::{Overlay, OverlayPath};
use crate::scope::{scope, Identity};
use crate::store::{LocalStore, WriteStatus};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Result of offering an envelope to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Newer than local state; written and announced.
    Applied,
    /// Not newer than local state; dropped.
    Stale,
    /// Not an envelope; dropped.
    Malformed,
    /// Newer, but the value or its timestamp could not be written; local
    /// state unchanged.
    Failed,
}

struct Inner {
    store: LocalStore,
    meta: MetaTracker,
    migrator: Migrator,
    overlay: Arc<dyn Overlay>,
    bus: ChangeBus,
    clock: Arc<dyn Clock>,
    root: String,
    /// Serializes local writes against remote applies.
    write_lock: Mutex<()>,
    /// (identity, logical key) pairs with a live subscription.
    started: Mutex<HashSet<(String, String)>>,
}

/// Per-identity key/value store replicated over a peer overlay.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncStore {
    inner: Arc<Inner>,
}

/// Builder for [`SyncStore`].
pub struct SyncStoreBuilder {
    store: LocalStore,
    overlay: Arc<dyn Overlay>,
    bus: Option<ChangeBus>,
    clock: Option<Arc<dyn Clock>>,
    root: Option<String>,
}

impl SyncStoreBuilder {
    /// Share an existing change bus.
    pub fn bus(mut self, bus: ChangeBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Use a custom time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Overlay root namespace.
    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Finish the store.
    pub fn build(self) -> SyncStore {
        SyncStore {
            inner: Arc::new(Inner {
                meta: MetaTracker::new(self.store.clone()),
                migrator: Migrator::new(self.store.clone()),
                store: self.store,
                overlay: self.overlay,
                bus: self.bus.unwrap_or_default(),
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                root: self.root.unwrap_or_else(|| DEFAULT_ROOT.to_string()),
                write_lock: Mutex::new(()),
                started: Mutex::new(HashSet::new()),
            }),
        }
    }
}

impl SyncStore {
    /// Create a store with a fresh change bus, the system clock and the default root.
    pub fn new(store: LocalStore, overlay: Arc<dyn Overlay>) -> Self {
        Self::builder(store, overlay).build()
    }

    /// Start configuring a store over `store` and `overlay`.
    pub fn builder(store: LocalStore, overlay: Arc<dyn Overlay>) -> SyncStoreBuilder {
        SyncStoreBuilder {
            store,
            overlay,
            bus: None,
            clock: None,
            root: None,
        }
    }

    /// Open a RocksDB-backed store in the configured data directory.
    #[cfg(feature = "rocksdb")]
    pub fn open(config: &crate::config::SyncConfig, overlay: Arc<dyn Overlay>) -> crate::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let backend = crate::backend::RocksBackend::open(&config.data_dir)?;
        let store = LocalStore::new(Arc::new(backend));

        match config.overlay_mode(&store) {
            crate::config::OverlayMode::Isolated => info!("Overlay running isolated (no peers)"),
            crate::config::OverlayMode::Peered(peers) => info!("Overlay peers: {}", peers.join(", ")),
        }

        Ok(Self::builder(store, overlay).root(config.root.clone()).build())
    }

    /// The underlying local store.
    pub fn local(&self) -> &LocalStore {
        &self.inner.store
    }

    /// Per-key timestamps of the last accepted update.
    pub fn meta(&self) -> &MetaTracker {
        &self.inner.meta
    }

    /// The change notification bus.
    pub fn bus(&self) -> &ChangeBus {
        &self.inner.bus
    }

    /// A chunk store over the same local storage.
    pub fn chunks(&self) -> ChunkStore {
        ChunkStore::new(self.inner.store.clone())
    }

    /// Overlay root namespace.
    pub fn root(&self) -> &str {
        &self.inner.root
    }

    // --- Reads ---

    /// Load the record for `base_key`, or `fallback` if missing or unparseable.
    pub fn load_json<T: DeserializeOwned>(
        &self,
        base_key: &str,
        identity: impl Into<Identity>,
        fallback: T,
    ) -> T {
        self.inner.store.load_json(base_key, &identity.into(), fallback)
    }

    /// Like [`SyncStore::load_json`], first migrating a pre-scoping record
    /// stored under the bare `base_key` (once per scoped key per store).
    pub fn load_migrated<T: DeserializeOwned>(
        &self,
        base_key: &str,
        identity: impl Into<Identity>,
        fallback: T,
    ) -> T {
        let identity = identity.into();
        self.inner
            .migrator
            .migrate_once(base_key, &scope(base_key, &identity));
        self.inner.store.load_json(base_key, &identity, fallback)
    }

    // --- Writes ---

    /// Serialize `data`, store it, and publish it to peers.
    pub fn save_json<T: Serialize + ?Sized>(
        &self,
        base_key: &str,
        identity: impl Into<Identity>,
        data: &T,
    ) -> WriteStatus {
        match serde_json::to_string(data) {
            Ok(raw) => self.save_raw(base_key, identity, &raw),
            Err(e) => {
                warn!("Failed to serialize {}: {}", base_key, e);
                WriteStatus::Failed(e.into())
            }
        }
    }

    /// Store an already-serialized record and publish it to peers.
    ///
    /// The envelope is published even if the local write fails.
    pub fn save_raw(&self, base_key: &str, identity: impl Into<Identity>, raw: &str) -> WriteStatus {
        let identity = identity.into();
        let inner = &self.inner;
        let (status, updated_at) = {
            let _guard = inner.write_lock.lock().unwrap_or_else(|e| e.into_inner());
            let status = inner.store.set(&scope(base_key, &identity), raw);
            let updated_at = self.next_timestamp(&identity, base_key);
            (status.and(inner.meta.bump(&identity, base_key, updated_at)), updated_at)
        };
        self.publish(&identity, base_key, Envelope::new(updated_at, raw));
        status
    }

    /// Clear a record. Peers converge on the empty value.
    pub fn remove(&self, base_key: &str, identity: impl Into<Identity>) -> WriteStatus {
        self.save_raw(base_key, identity, "")
    }

    /// A timestamp strictly greater than the key's last accepted update.
    fn next_timestamp(&self, identity: &Identity, base_key: &str) -> u64 {
        let local = self.inner.meta.local_updated_at(identity, base_key);
        self.inner.clock.now().max(local.saturating_add(1))
    }

    fn publish(&self, identity: &Identity, base_key: &str, envelope: Envelope) {
        let path = OverlayPath::state(&self.inner.root, identity.as_str(), base_key);
        debug!("Publishing {} at {}", path, envelope.updated_at);
        self.inner.overlay.put(&path, envelope.to_value());
    }

    // --- Remote updates ---

    /// Offer an overlay payload for `logical_key` under `identity`.
    ///
    /// Accepted only if it is a well-formed envelope strictly newer than the
    /// recorded timestamp. On acceptance the value is stored, the timestamp
    /// recorded, and one [`ChangeEvent`] emitted.
    pub fn apply_envelope(
        &self,
        identity: impl Into<Identity>,
        logical_key: &str,
        payload: &Value,
    ) -> ApplyOutcome {
        let Some(envelope) = Envelope::from_value(payload) else {
            debug!("Dropping malformed envelope for {}", logical_key);
            return ApplyOutcome::Malformed;
        };
        let identity = identity.into();
        let inner = &self.inner;

        {
            let _guard = inner.write_lock.lock().unwrap_or_else(|e| e.into_inner());

            let local = inner.meta.local_updated_at(&identity, logical_key);
            if !envelope.is_newer_than(local) {
                debug!(
                    "Dropping stale envelope for {}:{} ({} <= {})",
                    logical_key, identity, envelope.updated_at, local
                );
                return ApplyOutcome::Stale;
            }

            let scoped = scope(logical_key, &identity);
            let previous = inner.store.get(&scoped);
            if let WriteStatus::Failed(e) = inner.store.set(&scoped, &envelope.value) {
                warn!("Could not apply remote update for {}:{}: {}", logical_key, identity, e);
                return ApplyOutcome::Failed;
            }
            if let WriteStatus::Failed(e) = inner.meta.bump(&identity, logical_key, envelope.updated_at) {
                // The value must not outlive a timestamp that was never recorded.
                warn!("Could not record timestamp for {}:{}: {}", logical_key, identity, e);
                let restored = match previous {
                    Some(raw) => inner.store.set(&scoped, &raw),
                    None => inner.store.delete(&scoped),
                };
                if let Some(e) = restored.error() {
                    warn!("Could not restore {}:{}: {}", logical_key, identity, e);
                }
                return ApplyOutcome::Failed;
            }
        }

        info!(
            "Applied remote update for {}:{} at {}",
            logical_key, identity, envelope.updated_at
        );
        // Outside the write lock: handlers may read or write the store.
        inner
            .bus
            .notify(ChangeEvent::new(logical_key, identity.as_str()));
        ApplyOutcome::Applied
    }

    /// Subscribe to remote updates for `logical_key` under `identity`, then
    /// publish pre-existing local state that was never published.
    ///
    /// Must be called from within a tokio runtime. Returns `false` if the pair
    /// was already started or no runtime is available.
    pub fn start(&self, logical_key: &str, identity: impl Into<Identity>) -> bool {
        let identity = identity.into();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No tokio runtime; not syncing {}:{}", logical_key, identity);
            return false;
        };

        {
            let mut started = self.inner.started.lock().unwrap_or_else(|e| e.into_inner());
            if !started.insert((identity.as_str().to_string(), logical_key.to_string())) {
                return false;
            }
        }

        let path = OverlayPath::state(&self.inner.root, identity.as_str(), logical_key);
        let mut updates = self.inner.overlay.subscribe(&path);
        self.bootstrap(&identity, logical_key);

        let this = self.clone();
        let key = logical_key.to_string();
        runtime.spawn(async move {
            while let Some(payload) = updates.recv().await {
                this.apply_envelope(&identity, &key, &payload);
            }
            debug!("Subscription for {}:{} closed", key, identity);
        });
        true
    }

    /// Start every [`LogicalKey`] for `identity`. Returns how many were newly started.
    pub fn start_all(&self, identity: impl Into<Identity>) -> usize {
        let identity = identity.into();
        LogicalKey::ALL
            .iter()
            .filter(|key| self.start(key.as_str(), &identity))
            .count()
    }

    /// Publish the local record if it exists but has never been published.
    fn bootstrap(&self, identity: &Identity, logical_key: &str) -> bool {
        let inner = &self.inner;
        let (raw, updated_at) = {
            let _guard = inner.write_lock.lock().unwrap_or_else(|e| e.into_inner());
            let Some(raw) = inner.store.get(&scope(logical_key, identity)) else {
                return false;
            };
            if inner.meta.local_updated_at(identity, logical_key) != 0 {
                return false;
            }
            let updated_at = self.next_timestamp(identity, logical_key);
            if let WriteStatus::Failed(e) = inner.meta.bump(identity, logical_key, updated_at) {
                warn!("Not bootstrapping {}:{}: {}", logical_key, identity, e);
                return false;
            }
            (raw, updated_at)
        };
        self.publish(identity, logical_key, Envelope::new(updated_at, raw));
        info!("Bootstrapped unpublished {}:{} at {}", logical_key, identity, updated_at);
        true
    }

    // --- Identity directory ---

    /// Publish the shared identity list.
    pub fn sync_identities(&self, identities: &Value) {
        let path = OverlayPath::identities(&self.inner.root);
        self.inner.overlay.put(&path, identities.clone());
    }

    /// Identity lists as delivered by the overlay.
    pub fn watch_identities(&self) -> mpsc::UnboundedReceiver<Value> {
        self.inner
            .overlay
            .subscribe(&OverlayPath::identities(&self.inner.root))
    }
}

impl std::fmt::Debug for SyncStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStore")
            .field("root", &self.inner.root)
            .finish_non_exhaustive()
    }
}
