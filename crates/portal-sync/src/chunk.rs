//! Content-addressed chunk store.
//!
//! Chunks are immutable strings addressed by `local:{base64url(blake3(content))}`
//! and stored under `social-portal-chunk:{address}`. Identical content always
//! lands on the same address, so storing it twice is a no-op.

use crate::clock::now_millis;
use crate::keys::CHUNK_KEY_PREFIX;
use crate::store::{LocalStore, WriteStatus};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::Rng;
use tracing::warn;

/// Prefix of every chunk address.
pub const ADDRESS_PREFIX: &str = "local:";

/// How chunk addresses are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    /// 256-bit content digest; addresses are deterministic.
    #[default]
    ContentHash,
    /// Random addresses, for runtimes without a usable digest.
    /// Storing the same content twice yields two different chunks.
    Random,
}

/// Compute the content address of `content`.
pub fn content_address(content: &str) -> String {
    let digest = blake3::hash(content.as_bytes());
    format!("{}{}", ADDRESS_PREFIX, URL_SAFE_NO_PAD.encode(digest.as_bytes()))
}

fn random_address() -> String {
    let nonce: u64 = rand::thread_rng().gen();
    format!("{}rand-{:016x}{:x}", ADDRESS_PREFIX, nonce, now_millis())
}

/// Store for opaque blobs too large to inline in a record.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    store: LocalStore,
    mode: AddressMode,
}

impl ChunkStore {
    /// Content-addressed chunks over `store`.
    pub fn new(store: LocalStore) -> Self {
        Self::with_mode(store, AddressMode::ContentHash)
    }

    /// Chunks over `store` with an explicit address mode.
    pub fn with_mode(store: LocalStore, mode: AddressMode) -> Self {
        if mode == AddressMode::Random {
            warn!("Chunk store using random addresses; chunks are not content-addressed");
        }
        Self { store, mode }
    }

    /// How addresses are derived.
    pub fn mode(&self) -> AddressMode {
        self.mode
    }

    /// Store `content` and return its address.
    ///
    /// The address is returned even if persisting fails.
    pub fn store(&self, content: &str) -> String {
        self.store_with_status(content).0
    }

    /// Like [`ChunkStore::store`], also reporting whether the write landed.
    pub fn store_with_status(&self, content: &str) -> (String, WriteStatus) {
        let address = match self.mode {
            AddressMode::ContentHash => content_address(content),
            AddressMode::Random => random_address(),
        };
        let key = format!("{}{}", CHUNK_KEY_PREFIX, address);
        if self.mode == AddressMode::ContentHash && self.store.get(&key).as_deref() == Some(content) {
            return (address, WriteStatus::Written);
        }
        let status = self.store.set(&key, content);
        (address, status)
    }

    /// Content stored at `address`, or an empty string if absent.
    pub fn retrieve(&self, address: &str) -> String {
        self.store
            .get(&format!("{}{}", CHUNK_KEY_PREFIX, address))
            .unwrap_or_default()
    }

    /// Addresses of every stored chunk.
    pub fn addresses(&self) -> Vec<String> {
        self.store
            .keys_with_prefix(CHUNK_KEY_PREFIX)
            .into_iter()
            .filter_map(|k| k.strip_prefix(CHUNK_KEY_PREFIX).map(str::to_string))
            .collect()
    }
}
