//! Storage key layout of one cache instance.
//!
//! - Manifest: `<namespace><id>.l`
//! - Item: `<namespace><id>.i.<key>`

/// The storage keys owned by one cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    manifest: String,
    item_prefix: String,
}

impl KeySpace {
    pub fn new(namespace: &str, id: &str) -> Self {
        let prefix = format!("{namespace}{id}");
        Self {
            manifest: format!("{prefix}.l"),
            item_prefix: format!("{prefix}.i."),
        }
    }

    pub fn manifest(&self) -> &str {
        &self.manifest
    }

    /// Storage key of the item record for `key`.
    pub fn item(&self, key: &str) -> String {
        format!("{}{}", self.item_prefix, key)
    }

    pub fn item_prefix(&self) -> &str {
        &self.item_prefix
    }

    /// Maps a storage key back to the cache key, if it is one of our items.
    pub fn item_key_of<'a>(&self, storage_key: &'a str) -> Option<&'a str> {
        storage_key.strip_prefix(self.item_prefix.as_str())
    }
}
