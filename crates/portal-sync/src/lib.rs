//! Portal Sync - Per-Identity Replicated State
//!
//! Local-first key/value persistence for a client application. Every record is
//! scoped to an identity and opportunistically synchronized with other
//! instances of the same identity over a peer overlay. There is no central
//! server: conflicts resolve last-write-wins on per-record timestamps.
//!
//! # Architecture
//!
//! - **Scope**: `logical_key:identity` storage keys
//! - **Store**: synchronous, infallible reads and best-effort writes over a
//!   [`KvBackend`] (in-memory or RocksDB)
//! - **Meta**: per-identity record of each key's last accepted update
//! - **Replication**: publish on write, LWW apply on receipt, bootstrap of
//!   never-published local state
//! - **Chunks**: content-addressed blob storage
//! - **Notify**: change events for reactive consumers
//!
//! Persistence and sync are enhancements, not dependencies: no operation here
//! panics or returns an error to the caller because storage or the network
//! failed.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use portal_sync::{LocalStore, LogicalKey, MemoryOverlay, SyncStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = SyncStore::new(LocalStore::memory(), Arc::new(MemoryOverlay::new()));
//!     store.start_all("alice");
//!
//!     let _sub = store.bus().subscribe(|event| {
//!         println!("{} changed for {}", event.logical_key, event.identity);
//!     });
//!
//!     store.save_json(LogicalKey::Topics.as_str(), "alice", &vec!["rust"]);
//!     let topics: Vec<String> = store.load_json(LogicalKey::Topics.as_str(), "alice", vec![]);
//!     assert_eq!(topics, vec!["rust"]);
//! }
//! ```

pub mod backend;
pub mod chunk;
pub mod clock;
pub mod config;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod meta;
pub mod migrate;
pub mod notify;
pub mod overlay;
pub mod replication;
pub mod scope;
pub mod store;

#[cfg(feature = "rocksdb")]
pub use backend::RocksBackend;
pub use backend::{KvBackend, MemoryBackend};
pub use chunk::{AddressMode, ChunkStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{parse_peers, set_peers_config, OverlayMode, SyncConfig};
pub use envelope::Envelope;
pub use error::{Error, Result};
pub use keys::LogicalKey;
pub use meta::{MetaTracker, SyncMeta};
pub use migrate::{migrate, MigrationOutcome};
pub use notify::{ChangeBus, ChangeEvent, Subscription};
pub use overlay::{MemoryOverlay, Overlay, OverlayPath};
pub use replication::{ApplyOutcome, SyncStore, SyncStoreBuilder};
pub use scope::{scope, Identity, ANONYMOUS};
pub use store::{LocalStore, WriteStatus};
