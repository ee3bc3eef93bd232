//! Cache Facade
//!
//! Public handle on one named persistent cache, and the options it is
//! created with.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{pending, CacheStats, Cached, Resolver};
use crate::clock::{Clock, SystemClock};
use crate::codec::Codec;
use crate::error::{CacheError, Result};
use crate::persist::{Bound, KeySpace, PersistOptions, PersistentLru, Put};
use crate::registry::{Registered, RegistryInner};
use crate::storage::Storage;
use crate::tasks::DeferredFlush;

// == Cache Options ==
/// Per-cache settings, builder style.
///
/// `capacity` and `max_length` are mutually exclusive; with neither the cache
/// is unbounded.
pub struct CacheOptions<V> {
    capacity: Option<usize>,
    max_length: Option<usize>,
    max_age: Option<Duration>,
    codec: Option<Arc<dyn Codec<V>>>,
    storage: Option<Arc<dyn Storage>>,
    clock: Option<Arc<dyn Clock>>,
}

impl<V> CacheOptions<V> {
    pub fn new() -> Self {
        Self {
            capacity: None,
            max_length: None,
            max_age: None,
            codec: None,
            storage: None,
            clock: None,
        }
    }

    /// Maximum number of resident entries.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Maximum total weight in serialized characters.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Entries older than this are treated as missing.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn codec(mut self, codec: impl Codec<V> + 'static) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    /// Backing store, instead of the registry's.
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub(crate) fn bound(&self, id: &str) -> Result<Bound> {
        match (self.capacity, self.max_length) {
            (Some(_), Some(_)) => Err(CacheError::ConflictingBounds(id.to_string())),
            (Some(capacity), None) => Ok(Bound::Capacity(capacity)),
            (None, Some(max_length)) => Ok(Bound::MaxLength(max_length)),
            (None, None) => Ok(Bound::Unbounded),
        }
    }
}

impl<V> Default for CacheOptions<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for CacheOptions<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("capacity", &self.capacity)
            .field("max_length", &self.max_length)
            .field("max_age", &self.max_age)
            .field("custom_codec", &self.codec.is_some())
            .field("custom_storage", &self.storage.is_some())
            .finish()
    }
}

// == Cache Info ==
/// Configuration of a cache merged with its current occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
    pub id: String,
    pub capacity: Option<usize>,
    pub max_length: Option<usize>,
    pub max_age_ms: Option<u64>,
    /// Number of resident entries
    pub size: usize,
    /// Total weight of resident entries
    pub length: usize,
    #[serde(flatten)]
    pub stats: CacheStats,
}

/// Parts shared by every handle on one cache and by its flush task.
struct Shared<V> {
    id: String,
    bound: Bound,
    max_age: Option<Duration>,
    /// `None` once the cache is destroyed or closed
    inner: Mutex<Option<PersistentLru<V>>>,
    flush: DeferredFlush,
    registry: Weak<RegistryInner>,
}

impl<V: Clone + Send + Sync + 'static> Shared<V> {
    fn run_scheduled_flush(&self) {
        if let Some(bridge) = self.inner.lock().as_mut() {
            let written = bridge.flush_manifest();
            debug!(id = %self.id, written, "Deferred manifest flush");
        }
    }

    fn describe(&self) -> CacheInfo {
        let (size, length, stats) = match self.inner.lock().as_ref() {
            Some(bridge) => (bridge.len(), bridge.length(), bridge.stats()),
            None => (0, 0, CacheStats::default()),
        };
        CacheInfo {
            id: self.id.clone(),
            capacity: match self.bound {
                Bound::Capacity(capacity) => Some(capacity),
                _ => None,
            },
            max_length: match self.bound {
                Bound::MaxLength(max_length) => Some(max_length),
                _ => None,
            },
            max_age_ms: self
                .max_age
                .map(|age| u64::try_from(age.as_millis()).unwrap_or(u64::MAX)),
            size,
            length,
            stats,
        }
    }

    /// Lands the outcome of a [`Cache::fill`] computation.
    fn settle(&self, key: &str, id: u64, outcome: Option<V>, resolver: Resolver<V>) -> Result<Put<V>> {
        let mut inner = self.inner.lock();
        let Some(value) = outcome else {
            // Dropping the resolver wakes waiters with nothing
            if let Some(bridge) = inner.as_mut() {
                bridge.abandon_pending(key, id);
            }
            return Ok(Put::Rejected);
        };
        let put = match inner.as_mut() {
            Some(bridge) => bridge.resolve_pending(key, id, value.clone()),
            None => Ok(Put::Rejected),
        };
        resolver.resolve(value);
        put
    }

    /// Takes the bridge out, leaving the cache unusable. `None` if already
    /// torn down.
    fn take_down(&self) -> Option<PersistentLru<V>> {
        self.flush.cancel();
        let bridge = self.inner.lock().take()?;
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
        }
        Some(bridge)
    }
}

/// Drops the pending entry of a fill that never settled, because its future
/// panicked or its task was aborted. A settled fill leaves nothing to drop.
struct FillGuard<V: Clone + Send + Sync + 'static> {
    shared: Arc<Shared<V>>,
    key: String,
    id: u64,
}

impl<V: Clone + Send + Sync + 'static> Drop for FillGuard<V> {
    fn drop(&mut self) {
        if let Some(bridge) = self.shared.inner.lock().as_mut() {
            if bridge.abandon_pending(&self.key, self.id) {
                debug!(key = %self.key, "Fill did not complete, pending value dropped");
            }
        }
    }
}

impl<V: Clone + Send + Sync + 'static> Registered for Shared<V> {
    fn info(&self) -> CacheInfo {
        self.describe()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// == Cache ==
/// Handle on a named persistent cache.
///
/// Handles are cheap to clone and all observe the same cache. Operations are
/// synchronous; only the manifest write is deferred to the next scheduling
/// tick of the tokio runtime.
///
/// A burst of mutations yields exactly one manifest write on a current-thread
/// runtime. On a multi-thread runtime another worker may pick the flush up in
/// the middle of a burst, so a long burst can write the manifest several
/// times; the last write always reflects the final state.
pub struct Cache<V> {
    shared: Arc<Shared<V>>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> Cache<V> {
    /// Builds the cache and hydrates it from storage.
    pub(crate) fn open(
        id: &str,
        options: CacheOptions<V>,
        default_codec: impl FnOnce() -> Arc<dyn Codec<V>>,
        registry: &Arc<RegistryInner>,
    ) -> Result<Self> {
        let bound = options.bound(id)?;
        let storage = options.storage.unwrap_or_else(|| registry.storage());
        let codec = options.codec.unwrap_or_else(default_codec);
        let clock: Arc<dyn Clock> = match options.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let keys = KeySpace::new(registry.namespace(), id);
        let max_age = options.max_age;

        let shared = Arc::new_cyclic(|weak: &Weak<Shared<V>>| {
            let weak = weak.clone();
            let flush = DeferredFlush::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.run_scheduled_flush();
                }
            });
            let bridge = PersistentLru::new(PersistOptions {
                keys,
                storage,
                codec,
                bound,
                max_age,
                clock,
                flush: flush.clone(),
            });
            Shared {
                id: id.to_string(),
                bound,
                max_age,
                inner: Mutex::new(Some(bridge)),
                flush,
                registry: Arc::downgrade(registry),
            }
        });

        if let Some(bridge) = shared.inner.lock().as_mut() {
            bridge.load()?;
        }
        info!(id, ?bound, ?max_age, "Cache created");
        Ok(Self { shared })
    }

    pub(crate) fn registered(&self) -> Arc<dyn Registered> {
        self.shared.clone()
    }

    pub(crate) fn from_registered(entry: Arc<dyn Registered>) -> Option<Self> {
        let shared = entry.into_any().downcast::<Shared<V>>().ok()?;
        Some(Self { shared })
    }

    fn destroyed(&self) -> CacheError {
        CacheError::Destroyed(self.shared.id.clone())
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    // == Put ==
    /// Stores `value` under `key`.
    ///
    /// `None` is never stored. Returns [`Put::Rejected`] for it and for an
    /// entry heavier than the bound on its own, which leaves the cache as it
    /// was.
    pub fn put(&self, key: &str, value: impl Into<Option<V>>) -> Result<Put<V>> {
        let mut inner = self.shared.inner.lock();
        let bridge = inner.as_mut().ok_or_else(|| self.destroyed())?;
        match value.into() {
            Some(value) => bridge.put(key, value),
            None => Ok(Put::Rejected),
        }
    }

    // == Get ==
    /// Returns the entry under `key`, ready or pending. Misses, stale
    /// entries and destroyed caches all yield `None`.
    pub fn get(&self, key: &str) -> Option<Cached<V>> {
        self.shared.inner.lock().as_mut()?.get(key)
    }

    /// Returns the value under `key` if it is ready.
    pub fn get_value(&self, key: &str) -> Option<V> {
        self.get(key).and_then(Cached::into_ready)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.shared
            .inner
            .lock()
            .as_mut()
            .is_some_and(|bridge| bridge.remove(key))
    }

    pub fn remove_all(&self) {
        if let Some(bridge) = self.shared.inner.lock().as_mut() {
            bridge.remove_all();
        }
    }

    /// Evicts every stale entry. Returns how many were.
    pub fn prune(&self) -> usize {
        self.shared
            .inner
            .lock()
            .as_mut()
            .map_or(0, |bridge| bridge.prune())
    }

    // == Fill ==
    /// Caches the in-flight computation `future` under `key`.
    ///
    /// Readers see a pending value until the future completes. `Some(value)`
    /// then replaces it, unless the key was overwritten or removed meanwhile;
    /// `None` drops it, and so does a panicking future or an aborted task.
    /// Must be called within a tokio runtime.
    pub fn fill<F>(&self, key: &str, future: F) -> Result<JoinHandle<Result<Put<V>>>>
    where
        F: Future<Output = Option<V>> + Send + 'static,
    {
        let (resolver, handle) = pending();
        let id = handle.id();
        {
            let mut inner = self.shared.inner.lock();
            let bridge = inner.as_mut().ok_or_else(|| self.destroyed())?;
            bridge.put_pending(key, handle)?;
        }

        let guard = FillGuard {
            shared: Arc::clone(&self.shared),
            key: key.to_string(),
            id,
        };
        Ok(tokio::spawn(async move {
            let outcome = future.await;
            guard.shared.settle(&guard.key, guard.id, outcome, resolver)
        }))
    }

    /// Writes the manifest now instead of at the next tick.
    pub fn flush(&self) -> bool {
        self.shared
            .inner
            .lock()
            .as_mut()
            .is_some_and(|bridge| bridge.flush_manifest())
    }

    pub fn info(&self) -> CacheInfo {
        self.shared.describe()
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.shared.inner.lock().as_ref().map_or(0, |bridge| bridge.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resident keys, most recently used first.
    pub fn keys(&self) -> Vec<String> {
        self.shared
            .inner
            .lock()
            .as_ref()
            .map_or_else(Vec::new, |bridge| bridge.keys())
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.inner.lock().is_none()
    }

    // == Teardown ==
    /// Removes every persisted record of this cache and deregisters it.
    ///
    /// A pending flush is cancelled first. Later calls do nothing.
    pub fn destroy(&self) {
        let Some(mut bridge) = self.shared.take_down() else {
            return;
        };
        bridge.destroy();
        info!(id = %self.shared.id, "Cache destroyed");
    }

    /// Writes the manifest and deregisters the cache, keeping its records so
    /// a later cache with the same id reloads them.
    pub fn close(&self) {
        let Some(mut bridge) = self.shared.take_down() else {
            return;
        };
        bridge.close();
        info!(id = %self.shared.id, "Cache closed");
    }
}

impl<V> fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("id", &self.shared.id)
            .field("bound", &self.shared.bound)
            .finish()
    }
}
