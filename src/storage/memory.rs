//! In-memory storage backend with an optional character quota.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use super::{record_len, Storage};
use crate::error::StorageError;

#[derive(Debug, Default)]
struct MemoryState {
    items: BTreeMap<String, String>,
    /// Characters currently used by keys and values
    used: usize,
}

// == Memory Storage ==
/// A process-local store, the equivalent of session storage.
///
/// With a quota, writes that would push the total number of characters
/// (keys plus values) above it fail with [`StorageError::QuotaExceeded`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
    quota: Option<usize>,
}

impl MemoryStorage {
    /// Creates an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that holds at most `quota` characters.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            quota: Some(quota),
        }
    }

    /// Creates a store pre-filled with `items`, ignoring the quota while loading.
    pub(crate) fn from_items(items: BTreeMap<String, String>, quota: Option<usize>) -> Self {
        let used = items.iter().map(|(k, v)| record_len(k, v)).sum();
        Self {
            state: Mutex::new(MemoryState { items, used }),
            quota,
        }
    }

    pub fn quota(&self) -> Option<usize> {
        self.quota
    }

    /// Characters currently stored.
    pub fn used(&self) -> usize {
        self.state.lock().used
    }

    /// Copy of every stored record.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.state.lock().items.clone()
    }

    /// Removes every record.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.items.clear();
        state.used = 0;
    }
}

impl Storage for MemoryStorage {
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut state = self.state.lock();

        let previous = state
            .items
            .get(key)
            .map(|old| record_len(key, old))
            .unwrap_or(0);
        let needed = state.used - previous + record_len(key, value);

        if let Some(quota) = self.quota {
            if needed > quota {
                return Err(StorageError::QuotaExceeded { needed, quota });
            }
        }

        state.items.insert(key.to_string(), value.to_string());
        state.used = needed;
        Ok(())
    }

    fn get_item(&self, key: &str) -> Option<String> {
        self.state.lock().items.get(key).cloned()
    }

    fn remove_item(&self, key: &str) {
        let mut state = self.state.lock();
        if let Some(old) = state.items.remove(key) {
            state.used -= record_len(key, &old);
        }
    }

    fn key(&self, index: usize) -> Option<String> {
        self.state.lock().items.keys().nth(index).cloned()
    }

    fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    fn keys(&self) -> Vec<String> {
        self.state.lock().items.keys().cloned().collect()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_set_get_remove() {
        let storage = MemoryStorage::new();

        storage.set_item("a", "1").unwrap();
        storage.set_item("b", "2").unwrap();
        assert_eq!(storage.get_item("a"), Some("1".to_string()));
        assert_eq!(storage.len(), 2);

        storage.remove_item("a");
        assert_eq!(storage.get_item("a"), None);
        assert_eq!(storage.len(), 1);

        // Removing a missing key is ignored
        storage.remove_item("missing");
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_memory_storage_key_by_index() {
        let storage = MemoryStorage::new();
        storage.set_item("b", "2").unwrap();
        storage.set_item("a", "1").unwrap();

        assert_eq!(storage.key(0), Some("a".to_string()));
        assert_eq!(storage.key(1), Some("b".to_string()));
        assert_eq!(storage.key(2), None);
        assert_eq!(storage.keys(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_memory_storage_quota_rejects_overflow() {
        let storage = MemoryStorage::with_quota(10);

        storage.set_item("key", "12345").unwrap();
        assert_eq!(storage.used(), 8);

        let err = storage.set_item("k2", "xx").unwrap_err();
        assert_eq!(err, StorageError::QuotaExceeded { needed: 12, quota: 10 });
        // Failed writes leave the store unchanged
        assert_eq!(storage.get_item("k2"), None);
        assert_eq!(storage.used(), 8);
    }

    #[test]
    fn test_memory_storage_quota_counts_replacement() {
        let storage = MemoryStorage::with_quota(10);

        storage.set_item("key", "1234567").unwrap();
        // Replacing shrinks usage instead of adding to it
        storage.set_item("key", "1").unwrap();
        assert_eq!(storage.used(), 4);

        storage.remove_item("key");
        assert_eq!(storage.used(), 0);
    }

    #[test]
    fn test_memory_storage_clear() {
        let storage = MemoryStorage::new();
        storage.set_item("a", "1").unwrap();
        storage.clear();
        assert!(storage.is_empty());
        assert_eq!(storage.used(), 0);
    }
}
