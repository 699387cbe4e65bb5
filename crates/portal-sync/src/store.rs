//! Local persistent store.
//!
//! A thin, infallible facade over a [`KvBackend`]. Reads turn backend failures
//! into "absent"; writes swallow failures and hand back a [`WriteStatus`] that
//! callers may inspect or ignore.

use crate::backend::{KvBackend, MemoryBackend};
use crate::error::Error;
use crate::scope::{scope, Identity};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of a best-effort write.
#[derive(Debug)]
pub enum WriteStatus {
    /// The backend accepted the write.
    Written,
    /// The backend rejected the write; state may only live in memory elsewhere.
    Failed(Error),
}

impl WriteStatus {
    /// Whether the backend accepted the write.
    pub fn is_written(&self) -> bool {
        matches!(self, WriteStatus::Written)
    }

    /// The error, if the write failed.
    pub fn error(&self) -> Option<&Error> {
        match self {
            WriteStatus::Written => None,
            WriteStatus::Failed(e) => Some(e),
        }
    }

    /// Keep the first failure of two writes that belong to one operation.
    pub fn and(self, other: WriteStatus) -> WriteStatus {
        match self {
            WriteStatus::Written => other,
            failed => failed,
        }
    }
}

impl From<crate::Result<()>> for WriteStatus {
    fn from(r: crate::Result<()>) -> Self {
        match r {
            Ok(()) => WriteStatus::Written,
            Err(e) => WriteStatus::Failed(e),
        }
    }
}

/// Synchronous string store keyed by scoped keys.
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn KvBackend>,
}

impl LocalStore {
    /// Wrap a backend.
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    /// An ephemeral in-memory store.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Get the raw value under a storage key. Backend failures read as absent.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.backend.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("Read of {} failed, treating as absent: {}", key, e);
                None
            }
        }
    }

    /// Store a raw value. Failures are logged and returned, never raised.
    pub fn set(&self, key: &str, value: &str) -> WriteStatus {
        let status = WriteStatus::from(self.backend.put(key, value));
        if let WriteStatus::Failed(e) = &status {
            warn!("Write of {} failed: {}", key, e);
        }
        status
    }

    /// Remove a raw value.
    pub fn delete(&self, key: &str) -> WriteStatus {
        let status = WriteStatus::from(self.backend.delete(key));
        if let WriteStatus::Failed(e) = &status {
            warn!("Delete of {} failed: {}", key, e);
        }
        status
    }

    /// Whether a value (possibly empty) exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// List storage keys with the given prefix. Failures read as no keys.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.backend.keys_with_prefix(prefix).unwrap_or_else(|e| {
            warn!("Listing keys under {} failed: {}", prefix, e);
            Vec::new()
        })
    }

    /// Load and parse the record for `base_key` under `identity`.
    ///
    /// A missing key, an empty value, or unparseable JSON yields `fallback`.
    pub fn load_json<T: DeserializeOwned>(&self, base_key: &str, identity: &Identity, fallback: T) -> T {
        let key = scope(base_key, identity);
        let raw = match self.get(&key) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return fallback,
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                debug!("Discarding malformed record {}: {}", key, e);
                fallback
            }
        }
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FailingBackend;
    use std::collections::HashMap;

    #[test]
    fn load_missing_returns_fallback() {
        let store = LocalStore::memory();
        let alice = Identity::from("alice");
        let likes: HashMap<String, bool> = store.load_json("likes", &alice, HashMap::new());
        assert!(likes.is_empty());
    }

    #[test]
    fn load_parses_scoped_record() {
        let store = LocalStore::memory();
        store.set("topics:alice", r#"["rust","p2p"]"#);

        let topics: Vec<String> = store.load_json("topics", &Identity::from("alice"), vec![]);
        assert_eq!(topics, vec!["rust", "p2p"]);

        let other: Vec<String> = store.load_json("topics", &Identity::from("bob"), vec![]);
        assert!(other.is_empty());
    }

    #[test]
    fn corrupt_json_returns_fallback() {
        let store = LocalStore::memory();
        store.set("topics:alice", "{not json");
        let topics: Vec<String> = store.load_json("topics", &Identity::from("alice"), vec!["x".into()]);
        assert_eq!(topics, vec!["x"]);
    }

    #[test]
    fn wrong_shape_returns_fallback() {
        let store = LocalStore::memory();
        store.set("topics:alice", r#"{"a":1}"#);
        let topics: Vec<String> = store.load_json("topics", &Identity::from("alice"), vec![]);
        assert!(topics.is_empty());
    }

    #[test]
    fn empty_value_returns_fallback() {
        let store = LocalStore::memory();
        store.set("topics:alice", "");
        assert!(store.contains("topics:alice"));
        let topics: Vec<String> = store.load_json("topics", &Identity::from("alice"), vec!["d".into()]);
        assert_eq!(topics, vec!["d"]);
    }

    #[test]
    fn failing_backend_is_swallowed() {
        let store = LocalStore::new(Arc::new(FailingBackend));

        let status = store.set("k", "v");
        assert!(!status.is_written());
        assert!(status.error().is_some());

        assert_eq!(store.get("k"), None);
        assert!(store.keys_with_prefix("k").is_empty());
        let v: u32 = store.load_json("k", &Identity::anonymous(), 7);
        assert_eq!(v, 7);
    }

    #[test]
    fn status_and_keeps_first_failure() {
        let failed = WriteStatus::Failed(Error::Storage("first".into()));
        let combined = failed.and(WriteStatus::Written);
        assert!(!combined.is_written());

        let combined = WriteStatus::Written.and(WriteStatus::Written);
        assert!(combined.is_written());
    }
}
