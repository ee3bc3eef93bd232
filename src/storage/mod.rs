//! Storage Adapter Module
//!
//! Thin interface over a synchronous key/value string store, shaped like the
//! web storage API (`setItem/getItem/removeItem/key/length`).

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::StorageError;

// == Storage Trait ==
/// A synchronous string key/value store shared by reference.
///
/// Implementations use interior mutability: several caches may hold the same
/// store, each confined to its own key namespace.
pub trait Storage: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// Fails when the store is full; callers treat any error as "storage full".
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Returns the value under `key`, if present.
    fn get_item(&self, key: &str) -> Option<String>;

    /// Removes `key`. Missing keys are ignored.
    fn remove_item(&self, key: &str);

    /// Removes every key in `keys`. Backends that pay per mutation should
    /// override this to apply the batch at once.
    fn remove_items(&self, keys: &[String]) {
        for key in keys {
            self.remove_item(key);
        }
    }

    /// Returns the key at position `index`, if any.
    fn key(&self, index: usize) -> Option<String>;

    /// Number of stored keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored key. Backends with cheap iteration should override this.
    fn keys(&self) -> Vec<String> {
        (0..self.len()).filter_map(|index| self.key(index)).collect()
    }
}

/// Characters a record occupies in a quota-bounded store (key plus value).
pub fn record_len(key: &str, value: &str) -> usize {
    key.chars().count() + value.chars().count()
}
