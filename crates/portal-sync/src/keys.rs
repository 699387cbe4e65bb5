//! Logical keys and fixed storage names.

use std::fmt;

/// Unscoped local override for the peer list. Never replicated.
pub const PEERS_OVERRIDE_KEY: &str = "social-portal-gun-peers";

/// Base key of the per-identity sync metadata record.
pub const SYNC_META_BASE_KEY: &str = "social-portal-sync-meta";

/// Prefix under which chunk contents are stored.
pub const CHUNK_KEY_PREFIX: &str = "social-portal-chunk:";

/// A class of replicated application state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogicalKey {
    PinnedNetworks,
    Topics,
    CustomRss,
    Likes,
    Comments,
    Bookmarks,
    ThreadsTrendingHandles,
}

impl LogicalKey {
    /// Every tracked key, in subscription order.
    pub const ALL: [LogicalKey; 7] = [
        LogicalKey::PinnedNetworks,
        LogicalKey::Topics,
        LogicalKey::CustomRss,
        LogicalKey::Likes,
        LogicalKey::Comments,
        LogicalKey::Bookmarks,
        LogicalKey::ThreadsTrendingHandles,
    ];

    /// The storage name of this key.
    pub const fn as_str(&self) -> &'static str {
        match self {
            LogicalKey::PinnedNetworks => "social-portal-pinned-networks",
            LogicalKey::Topics => "social-portal-topics",
            LogicalKey::CustomRss => "social-portal-custom-rss",
            LogicalKey::Likes => "social-portal-likes",
            LogicalKey::Comments => "social-portal-comments",
            LogicalKey::Bookmarks => "social-portal-bookmarks",
            LogicalKey::ThreadsTrendingHandles => "social-portal-threads-trending-handles",
        }
    }

    /// Look up a key by its storage name or its short name (`likes`, `custom-rss`, ...).
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| {
            let full = k.as_str();
            full == name || full.strip_prefix("social-portal-") == Some(name)
        })
    }
}

impl AsRef<str> for LogicalKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_and_short_names() {
        assert_eq!(LogicalKey::parse("social-portal-likes"), Some(LogicalKey::Likes));
        assert_eq!(LogicalKey::parse("likes"), Some(LogicalKey::Likes));
        assert_eq!(LogicalKey::parse("pinned-networks"), Some(LogicalKey::PinnedNetworks));
        assert_eq!(LogicalKey::parse("gun-peers"), None);
    }

    #[test]
    fn names_are_unique() {
        let mut names: Vec<_> = LogicalKey::ALL.iter().map(|k| k.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), LogicalKey::ALL.len());
    }
}
