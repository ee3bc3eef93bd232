//! Cache Registry
//!
//! Explicit owner of a set of named caches sharing one storage backend.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{Codec, JsonCodec};
use crate::config::{Config, DEFAULT_NAMESPACE};
use crate::error::{CacheError, Result};
use crate::facade::{Cache, CacheInfo, CacheOptions};
use crate::storage::{FileStorage, MemoryStorage, Storage};

/// Type-erased view of a registered cache.
pub(crate) trait Registered: Send + Sync {
    fn info(&self) -> CacheInfo;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

pub(crate) struct RegistryInner {
    caches: Mutex<HashMap<String, Arc<dyn Registered>>>,
    storage: Arc<dyn Storage>,
    namespace: String,
}

impl RegistryInner {
    pub(crate) fn storage(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.storage)
    }

    pub(crate) fn namespace(&self) -> &str {
        &self.namespace
    }

    pub(crate) fn remove(&self, id: &str) {
        self.caches.lock().remove(id);
    }
}

// == Cache Registry ==
/// Maps ids to live caches.
///
/// Ids are unique within a registry: a cache is added by
/// [`create`](Self::create) and removed when destroyed or closed. Clones share
/// the same set of caches.
#[derive(Clone)]
pub struct CacheRegistry {
    inner: Arc<RegistryInner>,
}

impl CacheRegistry {
    /// Registry whose caches default to `storage`.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_namespace(storage, DEFAULT_NAMESPACE)
    }

    pub fn with_namespace(storage: Arc<dyn Storage>, namespace: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                caches: Mutex::new(HashMap::new()),
                storage,
                namespace: namespace.into(),
            }),
        }
    }

    /// Registry over the file storage described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = FileStorage::open(&config.storage_path, Some(config.storage_quota))?;
        Ok(Self::with_namespace(
            Arc::new(storage),
            config.namespace.clone(),
        ))
    }

    // == Create ==
    /// Creates, loads and registers the cache `id`.
    ///
    /// # Errors
    /// - `DuplicateId` if `id` is already registered
    /// - `ConflictingBounds` if both capacity and max length are set
    pub fn create<V>(&self, id: &str, options: CacheOptions<V>) -> Result<Cache<V>>
    where
        V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let mut caches = self.inner.caches.lock();
        if caches.contains_key(id) {
            return Err(CacheError::DuplicateId(id.to_string()));
        }

        let cache = Cache::open(
            id,
            options,
            || -> Arc<dyn Codec<V>> { Arc::new(JsonCodec::<V>::new()) },
            &self.inner,
        )?;
        caches.insert(id.to_string(), cache.registered());
        Ok(cache)
    }

    /// Looks up the cache `id`. `None` if absent or holding another value type.
    pub fn get<V>(&self, id: &str) -> Option<Cache<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        let entry = self.inner.caches.lock().get(id).cloned()?;
        Cache::from_registered(entry)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.caches.lock().contains_key(id)
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.caches.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.inner.caches.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Info of every registered cache, by id.
    pub fn info(&self) -> BTreeMap<String, CacheInfo> {
        let caches: Vec<Arc<dyn Registered>> =
            self.inner.caches.lock().values().cloned().collect();
        caches
            .into_iter()
            .map(|cache| {
                let info = cache.info();
                (info.id.clone(), info)
            })
            .collect()
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        self.inner.storage()
    }

    pub fn namespace(&self) -> &str {
        self.inner.namespace()
    }
}

impl Default for CacheRegistry {
    /// In-memory registry, the equivalent of session storage.
    fn default() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("namespace", &self.inner.namespace)
            .field("caches", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_lookup() {
        let registry = CacheRegistry::default();
        let cache = registry
            .create::<String>("users", CacheOptions::new().capacity(10))
            .unwrap();
        cache.put("a", "1".to_string()).unwrap();

        let found = registry.get::<String>("users").unwrap();
        assert_eq!(found.get_value("a"), Some("1".to_string()));
        assert!(registry.contains("users"));
        assert_eq!(registry.ids(), vec!["users"]);
    }

    #[test]
    fn test_get_with_wrong_type_is_none() {
        let registry = CacheRegistry::default();
        registry.create::<String>("c", CacheOptions::new()).unwrap();

        assert!(registry.get::<u64>("c").is_none());
        assert!(registry.get::<String>("missing").is_none());
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let registry = CacheRegistry::default();
        registry.create::<String>("c", CacheOptions::new()).unwrap();

        let err = registry.create::<String>("c", CacheOptions::new()).unwrap_err();
        assert!(matches!(err, CacheError::DuplicateId(id) if id == "c"));
    }

    #[test]
    fn test_conflicting_bounds_are_rejected() {
        let registry = CacheRegistry::default();
        let err = registry
            .create::<String>("c", CacheOptions::new().capacity(1).max_length(100))
            .unwrap_err();

        assert!(matches!(err, CacheError::ConflictingBounds(_)));
        assert!(!registry.contains("c"));
    }

    #[test]
    fn test_info_aggregates_caches() {
        let registry = CacheRegistry::default();
        let first = registry
            .create::<u32>("first", CacheOptions::new().capacity(5))
            .unwrap();
        registry
            .create::<u32>("second", CacheOptions::new().max_length(500))
            .unwrap();
        first.put("x", 1u32).unwrap();
        first.put("y", 2u32).unwrap();

        let info = registry.info();
        assert_eq!(info.len(), 2);
        assert_eq!(info["first"].size, 2);
        assert_eq!(info["first"].capacity, Some(5));
        assert_eq!(info["second"].max_length, Some(500));
        assert_eq!(info["second"].size, 0);
    }

    #[test]
    fn test_destroy_deregisters_and_frees_id() {
        let registry = CacheRegistry::default();
        let cache = registry.create::<String>("c", CacheOptions::new()).unwrap();

        cache.destroy();
        assert!(registry.is_empty());
        assert!(registry.create::<String>("c", CacheOptions::new()).is_ok());
    }

    #[test]
    fn test_from_config_uses_file_storage() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            namespace: "test.".to_string(),
            storage_path: dir.path().join("caches.json"),
            ..Config::default()
        };

        let registry = CacheRegistry::from_config(&config).unwrap();
        let cache = registry.create::<u32>("n", CacheOptions::new()).unwrap();
        cache.put("one", 1u32).unwrap();

        assert_eq!(registry.namespace(), "test.");
        assert_eq!(registry.storage().get_item("test.n.i.one"), Some("1".to_string()));
    }
}
