//! Storage collaborator driven by the server.
//!
//! The server never locks the store: the coordinator owns it exclusively
//! and applies operations one at a time, so implementations only need
//! `&mut self` access and `Send`.

use std::collections::HashMap;

use tracing::trace;

/// A stored value. Values are opaque byte strings.
pub type Value = Vec<u8>;

/// Key to multi-value storage.
///
/// A key maps to an ordered list of values. Operations on absent keys are
/// no-ops (or empty results), never errors.
pub trait KvStore: Send + 'static {
    /// Appends `value` to the list stored under `key`.
    fn put(&mut self, key: &str, value: Value);

    /// Returns every value stored under `key`, empty if the key is absent.
    fn get(&self, key: &str) -> Vec<Value>;

    /// Removes `key` and all of its values.
    fn delete(&mut self, key: &str);

    /// Replaces `old` with `new` in the list stored under `key`.
    fn update(&mut self, key: &str, old: &[u8], new: Value);
}

/// In-memory [`KvStore`] backed by a `HashMap`.
///
/// `update` replaces only the first value equal to `old`.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, Vec<Value>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently holding at least one value.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemoryStore {
    fn put(&mut self, key: &str, value: Value) {
        let values = self.entries.entry(key.to_string()).or_default();
        values.push(value);
        trace!(key, count = values.len(), "put");
    }

    fn get(&self, key: &str) -> Vec<Value> {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    fn delete(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            trace!(key, "delete");
        }
    }

    fn update(&mut self, key: &str, old: &[u8], new: Value) {
        let Some(values) = self.entries.get_mut(key) else {
            return;
        };

        if let Some(slot) = values.iter_mut().find(|v| v.as_slice() == old) {
            *slot = new;
            trace!(key, "update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: Vec<Value>) -> Vec<String> {
        values
            .into_iter()
            .map(|v| String::from_utf8(v).unwrap())
            .collect()
    }

    #[test]
    fn test_put_appends_values() {
        let mut store = MemoryStore::new();
        store.put("user", b"alice".to_vec());
        store.put("user", b"bob".to_vec());

        assert_eq!(strings(store.get("user")), vec!["alice", "bob"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_put_keeps_duplicates() {
        let mut store = MemoryStore::new();
        store.put("k", b"v".to_vec());
        store.put("k", b"v".to_vec());

        assert_eq!(store.get("k").len(), 2);
    }

    #[test]
    fn test_get_absent_key_is_empty() {
        let store = MemoryStore::new();
        assert!(store.get("missing").is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_removes_all_values() {
        let mut store = MemoryStore::new();
        store.put("user", b"alice".to_vec());
        store.put("user", b"bob".to_vec());
        store.delete("user");

        assert!(store.get("user").is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_absent_key_is_noop() {
        let mut store = MemoryStore::new();
        store.put("other", b"x".to_vec());
        store.delete("user");

        assert!(store.get("user").is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_replaces_matching_value() {
        let mut store = MemoryStore::new();
        store.put("user", b"alice".to_vec());
        store.put("user", b"bob".to_vec());
        store.update("user", b"alice", b"charlie".to_vec());

        assert_eq!(strings(store.get("user")), vec!["charlie", "bob"]);
    }

    #[test]
    fn test_update_replaces_first_match_only() {
        let mut store = MemoryStore::new();
        store.put("k", b"a".to_vec());
        store.put("k", b"a".to_vec());
        store.update("k", b"a", b"b".to_vec());

        assert_eq!(strings(store.get("k")), vec!["b", "a"]);
    }

    #[test]
    fn test_update_missing_old_value_is_noop() {
        let mut store = MemoryStore::new();
        store.put("user", b"alice".to_vec());
        store.update("user", b"zed", b"charlie".to_vec());
        store.update("absent", b"alice", b"charlie".to_vec());

        assert_eq!(strings(store.get("user")), vec!["alice"]);
        assert!(store.get("absent").is_empty());
    }

    #[test]
    fn test_store_is_object_safe() {
        let mut store: Box<dyn KvStore> = Box::new(MemoryStore::new());
        store.put("k", b"v".to_vec());
        assert_eq!(store.get("k"), vec![b"v".to_vec()]);
    }
}
