//! Legacy-key migration.
//!
//! Records written before identity scoping lived under the bare logical key.
//! Migration copies such a record verbatim to its scoped key, unless the
//! scoped key already holds a value.

use crate::store::{LocalStore, WriteStatus};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{info, warn};

/// What a migration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The new key already had a value; nothing copied.
    AlreadyPresent,
    /// No legacy value existed.
    NothingToMigrate,
    /// The legacy value was copied.
    Copied,
    /// The copy was attempted but the write failed.
    Failed,
}

/// Copy `legacy_key` to `new_key` if `new_key` is empty and `legacy_key` is not.
pub fn migrate(store: &LocalStore, legacy_key: &str, new_key: &str) -> MigrationOutcome {
    if store.contains(new_key) {
        return MigrationOutcome::AlreadyPresent;
    }
    let Some(legacy) = store.get(legacy_key) else {
        return MigrationOutcome::NothingToMigrate;
    };
    match store.set(new_key, &legacy) {
        WriteStatus::Written => {
            info!("Migrated legacy record {} -> {}", legacy_key, new_key);
            MigrationOutcome::Copied
        }
        WriteStatus::Failed(e) => {
            warn!("Migration {} -> {} failed: {}", legacy_key, new_key, e);
            MigrationOutcome::Failed
        }
    }
}

/// Runs each migration at most once per instance.
#[derive(Debug)]
pub struct Migrator {
    store: LocalStore,
    done: Mutex<HashSet<String>>,
}

impl Migrator {
    /// Create a migrator over `store`.
    pub fn new(store: LocalStore) -> Self {
        Self {
            store,
            done: Mutex::new(HashSet::new()),
        }
    }

    /// Migrate into `new_key` unless that was already done by this instance.
    ///
    /// Returns `None` when skipped.
    pub fn migrate_once(&self, legacy_key: &str, new_key: &str) -> Option<MigrationOutcome> {
        let mut done = self.done.lock().unwrap_or_else(|e| e.into_inner());
        if done.contains(new_key) {
            return None;
        }
        let outcome = migrate(&self.store, legacy_key, new_key);
        if outcome != MigrationOutcome::Failed {
            done.insert(new_key.to_string());
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_legacy_value() {
        let store = LocalStore::memory();
        store.set("social-portal-likes", r#"{"u":true}"#);

        let outcome = migrate(&store, "social-portal-likes", "social-portal-likes:alice");
        assert_eq!(outcome, MigrationOutcome::Copied);
        assert_eq!(
            store.get("social-portal-likes:alice").as_deref(),
            Some(r#"{"u":true}"#)
        );
        // Legacy record is left in place.
        assert!(store.contains("social-portal-likes"));
    }

    #[test]
    fn never_overwrites_new_key() {
        let store = LocalStore::memory();
        store.set("legacy", "old");
        store.set("new", "current");

        assert_eq!(migrate(&store, "legacy", "new"), MigrationOutcome::AlreadyPresent);
        assert_eq!(store.get("new").as_deref(), Some("current"));
    }

    #[test]
    fn no_legacy_value() {
        let store = LocalStore::memory();
        assert_eq!(migrate(&store, "legacy", "new"), MigrationOutcome::NothingToMigrate);
        assert!(!store.contains("new"));
    }

    #[test]
    fn idempotent() {
        let store = LocalStore::memory();
        store.set("legacy", "v1");

        migrate(&store, "legacy", "new");
        store.set("legacy", "v2");
        migrate(&store, "legacy", "new");

        assert_eq!(store.get("new").as_deref(), Some("v1"));
    }

    #[test]
    fn migrator_runs_once() {
        let store = LocalStore::memory();
        let migrator = Migrator::new(store.clone());

        assert_eq!(migrator.migrate_once("legacy", "new"), Some(MigrationOutcome::NothingToMigrate));

        // A legacy value appearing later is not picked up by the same instance.
        store.set("legacy", "late");
        assert_eq!(migrator.migrate_once("legacy", "new"), None);
        assert!(!store.contains("new"));
    }
}
