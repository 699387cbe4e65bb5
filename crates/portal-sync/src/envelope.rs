//! Replication envelope: the timestamped value unit exchanged over the overlay.

use serde::Serialize;
use serde_json::Value;

/// `{ "updatedAt": <ms>, "value": "<serialized record>" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    /// Unix timestamp in milliseconds (for last-write-wins).
    #[serde(rename = "updatedAt")]
    pub updated_at: u64,
    /// The record, already serialized.
    pub value: String,
}

impl Envelope {
    /// Wrap a serialized record with its timestamp.
    pub fn new(updated_at: u64, value: impl Into<String>) -> Self {
        Self {
            updated_at,
            value: value.into(),
        }
    }

    /// Check if this envelope supersedes a recorded timestamp.
    /// Ties do not: the first value seen for a timestamp wins.
    pub fn is_newer_than(&self, timestamp: u64) -> bool {
        self.updated_at > timestamp
    }

    /// Decode an overlay payload.
    ///
    /// Returns `None` unless the payload is an object carrying a string `value`
    /// and a non-negative integral `updatedAt`. Extra fields are ignored.
    pub fn from_value(payload: &Value) -> Option<Self> {
        let obj = payload.as_object()?;
        let value = obj.get("value")?.as_str()?;
        let updated_at = match obj.get("updatedAt")? {
            Value::Number(n) => n.as_u64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            })?,
            _ => return None,
        };
        Some(Self::new(updated_at, value))
    }

    /// Encode as an overlay payload.
    pub fn to_value(&self) -> Value {
        serde_json::json!({ "updatedAt": self.updated_at, "value": self.value })
    }
}
