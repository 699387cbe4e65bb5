//! Synchronous string key-value backends.

use crate::error::Result;
use std::collections::HashMap;
use std::sync::RwLock;

/// A synchronous string key-value store.
///
/// Each call is atomic per key. Errors are reported, never panicked on; the
/// layers above decide whether to swallow them.
pub trait KvBackend: Send + Sync {
    /// Get the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`.
    fn delete(&self, key: &str) -> Result<()>;

    /// List keys starting with `prefix`.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// In-process backend. State lives only as long as the value.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> crate::Error {
    crate::Error::Storage("memory backend lock poisoned".into())
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        let mut keys: Vec<String> = entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(feature = "rocksdb")]
pub use rocks::RocksBackend;

#[cfg(feature = "rocksdb")]
mod rocks {
    use super::KvBackend;
    use crate::error::{Error, Result};
    use rocksdb::{Options, DB};
    use std::path::Path;

    /// Persistent backend using RocksDB.
    pub struct RocksBackend {
        db: DB,
    }

    impl RocksBackend {
        /// Open or create a database at the given path.
        pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
            let mut opts = Options::default();
            opts.create_if_missing(true);
            let db = DB::open(&opts, path)?;
            Ok(Self { db })
        }
    }

    impl KvBackend for RocksBackend {
        fn get(&self, key: &str) -> Result<Option<String>> {
            match self.db.get(key.as_bytes())? {
                Some(data) => String::from_utf8(data)
                    .map(Some)
                    .map_err(|_| Error::Storage(format!("non-UTF-8 value under {}", key))),
                None => Ok(None),
            }
        }

        fn put(&self, key: &str, value: &str) -> Result<()> {
            self.db.put(key.as_bytes(), value.as_bytes())?;
            Ok(())
        }

        fn delete(&self, key: &str) -> Result<()> {
            self.db.delete(key.as_bytes())?;
            Ok(())
        }

        fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
            let mut keys = Vec::new();
            for item in self.db.prefix_iterator(prefix.as_bytes()) {
                let (key, _) = item?;
                if !key.starts_with(prefix.as_bytes()) {
                    break;
                }
                keys.push(String::from_utf8_lossy(&key).into_owned());
            }
            Ok(keys)
        }
    }
}

/// Backend whose every operation fails, standing in for a full or unavailable store.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FailingBackend;

#[cfg(test)]
impl KvBackend for FailingBackend {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(crate::Error::Storage("backend unavailable".into()))
    }

    fn put(&self, _key: &str, _value: &str) -> Result<()> {
        Err(crate::Error::Storage("quota exceeded".into()))
    }

    fn delete(&self, _key: &str) -> Result<()> {
        Err(crate::Error::Storage("backend unavailable".into()))
    }

    fn keys_with_prefix(&self, _prefix: &str) -> Result<Vec<String>> {
        Err(crate::Error::Storage("backend unavailable".into()))
    }
}
