//! Ordered, append-only metadata map shared by results and chunks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered key/value metadata.
///
/// Keys keep their insertion order when serialized. Stages only ever add
/// keys: [`Metadata::insert_new`] leaves an existing value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key` if it is not present yet. Returns `false` when the key
    /// already existed and the value was discarded.
    pub fn insert_new(&mut self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        let key = key.into();
        if self.0.contains_key(&key) {
            log::debug!("Metadata key '{}' already set, keeping first value", key);
            return false;
        }
        self.0.insert(key, value.into());
        true
    }

    /// Adds every entry of `other` that is not present yet.
    pub fn extend_new(&mut self, other: &Metadata) {
        for (key, value) in other.iter() {
            self.insert_new(key.clone(), value.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Metadata {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (key, value) in iter {
            metadata.insert_new(key, value);
        }
        metadata
    }
}
