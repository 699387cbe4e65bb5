//! Identity scoping.
//!
//! Every record lives under `"{logical_key}:{identity}"`. The identity is an
//! opaque string supplied by the caller on each operation; an absent or empty
//! identity resolves to [`ANONYMOUS`].

use std::fmt;

/// Identity used when none has been established.
pub const ANONYMOUS: &str = "anonymous";

/// An identity scoping all stored state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    /// Resolve an optional identity, falling back to [`ANONYMOUS`] for `None`
    /// or an empty string.
    pub fn new(identity: Option<&str>) -> Self {
        match identity {
            Some(id) if !id.is_empty() => Self(id.to_string()),
            _ => Self::anonymous(),
        }
    }

    /// The reserved default identity.
    pub fn anonymous() -> Self {
        Self(ANONYMOUS.to_string())
    }

    /// Get the identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the reserved default identity.
    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self::new(Some(s))
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self::new(Some(&s))
    }
}

impl From<Option<&str>> for Identity {
    fn from(s: Option<&str>) -> Self {
        Self::new(s)
    }
}

impl From<&Identity> for Identity {
    fn from(id: &Identity) -> Self {
        id.clone()
    }
}

/// Derive the storage key for a logical key under an identity.
pub fn scope(logical_key: &str, identity: &Identity) -> String {
    format!("{}:{}", logical_key, identity.as_str())
}
