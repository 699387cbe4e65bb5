//! Sync metadata: per identity, the timestamp of each key's last accepted update.
//!
//! Stored as a single JSON object under `social-portal-sync-meta:{identity}`.
//! Meta writes go straight to the local store and are never replicated.

use crate::keys::SYNC_META_BASE_KEY;
use crate::scope::{scope, Identity};
use crate::store::{LocalStore, WriteStatus};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Logical key → last accepted update (ms since epoch).
pub type SyncMeta = BTreeMap<String, u64>;

/// Tracks last-update timestamps per (identity, logical key).
#[derive(Debug)]
pub struct MetaTracker {
    store: LocalStore,
    /// Serializes read-modify-write of the meta record.
    lock: Mutex<()>,
}

impl MetaTracker {
    /// Track timestamps in `store`.
    pub fn new(store: LocalStore) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// All timestamps recorded for `identity`.
    ///
    /// Entries that are not non-negative integers are ignored; an unreadable
    /// record reads as empty.
    pub fn snapshot(&self, identity: &Identity) -> SyncMeta {
        let raw: BTreeMap<String, serde_json::Value> =
            self.store.load_json(SYNC_META_BASE_KEY, identity, BTreeMap::new());
        raw.into_iter()
            .filter_map(|(k, v)| v.as_u64().map(|ts| (k, ts)))
            .collect()
    }

    /// Timestamp of the last accepted update, or 0 if never set.
    pub fn local_updated_at(&self, identity: &Identity, logical_key: &str) -> u64 {
        self.snapshot(identity).get(logical_key).copied().unwrap_or(0)
    }

    /// Record `timestamp` for the key, overwriting unconditionally.
    pub fn bump(&self, identity: &Identity, logical_key: &str, timestamp: u64) -> WriteStatus {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut meta = self.snapshot(identity);
        meta.insert(logical_key.to_string(), timestamp);
        match serde_json::to_string(&meta) {
            Ok(json) => self.store.set(&scope(SYNC_META_BASE_KEY, identity), &json),
            Err(e) => WriteStatus::Failed(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_zero() {
        let meta = MetaTracker::new(LocalStore::memory());
        assert_eq!(meta.local_updated_at(&Identity::from("alice"), "likes"), 0);
    }

    #[test]
    fn bump_overwrites() {
        let meta = MetaTracker::new(LocalStore::memory());
        let alice = Identity::from("alice");

        assert!(meta.bump(&alice, "likes", 200).is_written());
        assert_eq!(meta.local_updated_at(&alice, "likes"), 200);

        // Unconditional: callers enforce monotonicity.
        meta.bump(&alice, "likes", 100);
        assert_eq!(meta.local_updated_at(&alice, "likes"), 100);
    }

    #[test]
    fn keys_and_identities_are_independent() {
        let meta = MetaTracker::new(LocalStore::memory());
        let alice = Identity::from("alice");
        let bob = Identity::from("bob");

        meta.bump(&alice, "likes", 10);
        meta.bump(&alice, "comments", 20);
        meta.bump(&bob, "likes", 30);

        assert_eq!(meta.local_updated_at(&alice, "likes"), 10);
        assert_eq!(meta.local_updated_at(&alice, "comments"), 20);
        assert_eq!(meta.local_updated_at(&bob, "likes"), 30);
        assert_eq!(meta.snapshot(&alice).len(), 2);
    }

    #[test]
    fn persisted_as_single_record() {
        let store = LocalStore::memory();
        let meta = MetaTracker::new(store.clone());
        meta.bump(&Identity::from("alice"), "likes", 42);

        let raw = store.get("social-portal-sync-meta:alice").unwrap();
        assert_eq!(raw, r#"{"likes":42}"#);
    }

    #[test]
    fn ignores_non_integer_entries() {
        let store = LocalStore::memory();
        store.set("social-portal-sync-meta:alice", r#"{"likes":"soon","topics":7}"#);
        let meta = MetaTracker::new(store);
        let alice = Identity::from("alice");

        assert_eq!(meta.local_updated_at(&alice, "likes"), 0);
        assert_eq!(meta.local_updated_at(&alice, "topics"), 7);
    }

    #[test]
    fn corrupt_record_reads_as_empty() {
        let store = LocalStore::memory();
        store.set("social-portal-sync-meta:alice", "[[[");
        let meta = MetaTracker::new(store);
        assert!(meta.snapshot(&Identity::from("alice")).is_empty());
    }
}
