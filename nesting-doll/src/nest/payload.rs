//! Opaque key/value data carried by a nested context.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Payload contents.
pub type PayloadMap = HashMap<String, serde_json::Value>;

/// A thread-safe, exclusively owned payload.
///
/// Values are cloned in and out, so nothing outside the payload can alter
/// what it holds. Missing or empty keys read as `None` and are ignored on
/// write.
#[derive(Debug, Default)]
pub struct Payload {
    data: RwLock<PayloadMap>,
}

fn usable(key: Option<&str>) -> Option<&str> {
    key.filter(|k| !k.is_empty())
}

impl Payload {
    /// Creates a payload holding `data`, or an empty one.
    #[must_use]
    pub fn from_data(data: Option<PayloadMap>) -> Self {
        Self {
            data: RwLock::new(data.unwrap_or_default()),
        }
    }

    /// Returns a copy of the value under `key`.
    #[must_use]
    pub fn get(&self, key: Option<&str>) -> Option<serde_json::Value> {
        let key = usable(key)?;
        self.data.read().get(key).cloned()
    }

    /// Stores `value` under `key`, overwriting any existing value.
    pub fn set(&self, key: Option<&str>, value: serde_json::Value) {
        if let Some(key) = usable(key) {
            self.data.write().insert(key.to_string(), value);
        }
    }

    /// Replaces the whole payload.
    pub fn reset(&self, data: Option<PayloadMap>) {
        *self.data.write() = data.unwrap_or_default();
    }

    /// Returns a deep copy of the payload.
    #[must_use]
    pub fn snapshot(&self) -> PayloadMap {
        self.data.read().clone()
    }
}
