//! Peer overlay interface.
//!
//! The overlay is a path-addressed graph (`root → "state" → identity → key`)
//! that floods values to every peer subscribed to a path. Transport and peer
//! discovery live behind the [`Overlay`] trait; [`MemoryOverlay`] is the
//! in-process implementation used in isolated mode and as a shared hub in tests.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Path segment holding per-identity replicated state.
pub const STATE_SEGMENT: &str = "state";

/// Path segment holding the shared identity list.
pub const IDENTITIES_SEGMENT: &str = "identities";

/// A path in the overlay graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OverlayPath(Vec<String>);

impl OverlayPath {
    /// A single-segment path.
    pub fn root(root: &str) -> Self {
        Self(vec![root.to_string()])
    }

    /// Extend this path by one segment.
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    /// `root/state/{identity}/{logical_key}`
    pub fn state(root: &str, identity: &str, logical_key: &str) -> Self {
        Self::root(root)
            .child(STATE_SEGMENT)
            .child(identity)
            .child(logical_key)
    }

    /// `root/identities`
    pub fn identities(root: &str) -> Self {
        Self::root(root).child(IDENTITIES_SEGMENT)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for OverlayPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// A decentralized data-sync overlay.
///
/// `put` is fire-and-forget: no acknowledgement, no retry beyond what the
/// transport does natively. A subscription delivers every value that arrives at
/// the path, including echoes of this process's own puts, for as long as the
/// receiver is alive; payloads are unvalidated JSON.
pub trait Overlay: Send + Sync {
    /// Publish a value at `path`.
    fn put(&self, path: &OverlayPath, value: Value);

    /// Subscribe to values at `path`.
    fn subscribe(&self, path: &OverlayPath) -> mpsc::UnboundedReceiver<Value>;
}

#[derive(Default)]
struct PathNode {
    current: Option<Value>,
    subscribers: Vec<mpsc::UnboundedSender<Value>>,
}

/// In-process overlay. Every handle to the same instance sees every put.
///
/// A new subscriber is first handed the current value at the path, if any.
#[derive(Default)]
pub struct MemoryOverlay {
    nodes: Mutex<HashMap<OverlayPath, PathNode>>,
}

impl MemoryOverlay {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// The last value put at `path`.
    pub fn get(&self, path: &OverlayPath) -> Option<Value> {
        let nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        nodes.get(path).and_then(|n| n.current.clone())
    }

    /// Number of live subscriptions at `path`.
    pub fn subscriber_count(&self, path: &OverlayPath) -> usize {
        let nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        nodes
            .get(path)
            .map(|n| n.subscribers.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }
}

impl Overlay for MemoryOverlay {
    fn put(&self, path: &OverlayPath, value: Value) {
        let mut nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        let node = nodes.entry(path.clone()).or_default();
        node.subscribers.retain(|tx| tx.send(value.clone()).is_ok());
        node.current = Some(value);
    }

    fn subscribe(&self, path: &OverlayPath) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        let node = nodes.entry(path.clone()).or_default();
        if let Some(current) = &node.current {
            let _ = tx.send(current.clone());
        }
        node.subscribers.push(tx);
        rx
    }
}

impl fmt::Debug for MemoryOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("MemoryOverlay").field("paths", &nodes.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_layout() {
        let path = OverlayPath::state("social-portal", "alice", "social-portal-likes");
        assert_eq!(path.to_string(), "social-portal/state/alice/social-portal-likes");
        assert_eq!(path.segments().len(), 4);
        assert_eq!(OverlayPath::identities("social-portal").to_string(), "social-portal/identities");
    }

    #[test]
    fn subscribers_receive_puts() {
        let overlay = MemoryOverlay::new();
        let path = OverlayPath::state("r", "alice", "likes");
        let mut a = overlay.subscribe(&path);
        let mut b = overlay.subscribe(&path);

        overlay.put(&path, json!({"updatedAt": 1, "value": "x"}));

        assert_eq!(a.try_recv().unwrap(), json!({"updatedAt": 1, "value": "x"}));
        assert_eq!(b.try_recv().unwrap(), json!({"updatedAt": 1, "value": "x"}));
        assert!(a.try_recv().is_err());
    }

    #[test]
    fn late_subscriber_gets_current_value() {
        let overlay = MemoryOverlay::new();
        let path = OverlayPath::state("r", "alice", "likes");
        overlay.put(&path, json!(1));
        overlay.put(&path, json!(2));

        let mut rx = overlay.subscribe(&path);
        assert_eq!(rx.try_recv().unwrap(), json!(2));
        assert!(rx.try_recv().is_err());
        assert_eq!(overlay.get(&path), Some(json!(2)));
    }

    #[test]
    fn paths_are_isolated() {
        let overlay = MemoryOverlay::new();
        let likes = OverlayPath::state("r", "alice", "likes");
        let topics = OverlayPath::state("r", "alice", "topics");
        let mut rx = overlay.subscribe(&topics);

        overlay.put(&likes, json!(1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let overlay = MemoryOverlay::new();
        let path = OverlayPath::identities("r");
        let rx = overlay.subscribe(&path);
        assert_eq!(overlay.subscriber_count(&path), 1);

        drop(rx);
        overlay.put(&path, json!([]));
        assert_eq!(overlay.subscriber_count(&path), 0);
    }
}
