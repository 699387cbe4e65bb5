//! Configuration from the environment, with a local override for the peer list.

use crate::keys::PEERS_OVERRIDE_KEY;
use crate::store::{LocalStore, WriteStatus};
use std::path::PathBuf;

/// Default overlay root namespace.
pub const DEFAULT_ROOT: &str = "social-portal";

/// Configuration for a sync store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Data directory for persistent storage
    pub data_dir: PathBuf,

    /// Peer list from the environment (comma-separated), if set
    pub env_peers: Option<String>,

    /// Overlay root namespace
    pub root: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl SyncConfig {
    /// Create config from environment variables with sensible defaults.
    ///
    /// - `PORTAL_DATA_DIR` (default `./portal-data`)
    /// - `PORTAL_PEERS` comma-separated peer list
    /// - `PORTAL_ROOT` overlay root (default `social-portal`)
    pub fn from_env() -> Self {
        let data_dir = PathBuf::from(
            std::env::var("PORTAL_DATA_DIR").unwrap_or_else(|_| "./portal-data".to_string()),
        );
        let env_peers = std::env::var("PORTAL_PEERS").ok();
        let root = std::env::var("PORTAL_ROOT")
            .ok()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ROOT.to_string());

        Self {
            data_dir,
            env_peers,
            root,
        }
    }

    /// The effective peer list: the environment value if non-blank, else the
    /// local override, else empty.
    pub fn peers_csv(&self, store: &LocalStore) -> String {
        if let Some(env) = self.env_peers.as_deref().map(str::trim) {
            if !env.is_empty() {
                return env.to_string();
            }
        }
        store.get(PEERS_OVERRIDE_KEY).unwrap_or_default()
    }

    /// How the overlay should run given the effective peer list.
    pub fn overlay_mode(&self, store: &LocalStore) -> OverlayMode {
        OverlayMode::from_peers(parse_peers(&self.peers_csv(store)))
    }
}

/// Persist the local peer-list override.
pub fn set_peers_config(store: &LocalStore, peers_csv: &str) -> WriteStatus {
    store.set(PEERS_OVERRIDE_KEY, peers_csv)
}

/// Split a comma-separated peer list, trimming entries and dropping empties.
pub fn parse_peers(peers_csv: &str) -> Vec<String> {
    peers_csv
        .split(',')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether the overlay talks to remote peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayMode {
    /// No peers configured: local-only.
    Isolated,
    /// Sync with the listed peers.
    Peered(Vec<String>),
}

impl OverlayMode {
    /// Isolated for an empty list, peered otherwise.
    pub fn from_peers(peers: Vec<String>) -> Self {
        if peers.is_empty() {
            OverlayMode::Isolated
        } else {
            OverlayMode::Peered(peers)
        }
    }

    /// The configured peers, empty when isolated.
    pub fn peers(&self) -> &[String] {
        match self {
            OverlayMode::Isolated => &[],
            OverlayMode::Peered(peers) => peers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(env_peers: Option<&str>) -> SyncConfig {
        SyncConfig {
            data_dir: PathBuf::from("/tmp/unused"),
            env_peers: env_peers.map(str::to_string),
            root: DEFAULT_ROOT.to_string(),
        }
    }

    #[test]
    fn parse_trims_and_drops_empty() {
        assert_eq!(
            parse_peers(" http://a/gun , ,http://b/gun,"),
            vec!["http://a/gun", "http://b/gun"]
        );
        assert!(parse_peers("").is_empty());
        assert!(parse_peers(" , ").is_empty());
    }

    #[test]
    fn env_wins_over_override() {
        let store = LocalStore::memory();
        set_peers_config(&store, "http://local/gun");
        assert_eq!(config(Some(" http://env/gun ")).peers_csv(&store), "http://env/gun");
    }

    #[test]
    fn blank_env_falls_back_to_override() {
        let store = LocalStore::memory();
        set_peers_config(&store, "http://local/gun");
        assert_eq!(config(Some("   ")).peers_csv(&store), "http://local/gun");
        assert_eq!(config(None).peers_csv(&store), "http://local/gun");
    }

    #[test]
    fn no_peers_is_isolated() {
        let store = LocalStore::memory();
        assert_eq!(config(None).overlay_mode(&store), OverlayMode::Isolated);
        assert!(OverlayMode::Isolated.peers().is_empty());
    }

    #[test]
    fn peered_mode_lists_peers() {
        let store = LocalStore::memory();
        let mode = config(Some("a,b")).overlay_mode(&store);
        assert_eq!(mode, OverlayMode::Peered(vec!["a".into(), "b".into()]));
        assert_eq!(mode.peers().len(), 2);
    }
}
