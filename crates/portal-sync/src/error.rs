//! Error types for portal-sync.

use thiserror::Error;

/// Result type for portal-sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the storage and replication layers.
///
/// None of these escape the public read/write path of [`crate::SyncStore`];
/// they are logged there and surfaced only through [`crate::WriteStatus`].
#[derive(Debug, Error)]
pub enum Error {
    /// Backend storage error (quota, corruption, closed database)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "rocksdb")]
impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
