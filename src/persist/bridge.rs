//! Persistence Bridge
//!
//! Couples an [`LruEngine`] with a [`Storage`] backend. Item records are
//! written synchronously by the operation producing them; the manifest is
//! rewritten by a coalesced deferred flush.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::keys::KeySpace;
use super::manifest::Manifest;
use crate::cache::{CacheStats, Cached, LruEngine, Pending, StorageWeigher, WeightMode};
use crate::clock::Clock;
use crate::codec::Codec;
use crate::error::Result;
use crate::storage::Storage;
use crate::tasks::DeferredFlush;

// == Bound ==
/// The single active bound of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Maximum number of resident entries
    Capacity(usize),
    /// Maximum total weight, in serialized characters
    MaxLength(usize),
    /// No practical limit
    Unbounded,
}

impl Bound {
    /// The engine bound this translates to.
    pub fn max(&self) -> usize {
        match self {
            Bound::Capacity(max) | Bound::MaxLength(max) => *max,
            Bound::Unbounded => usize::MAX,
        }
    }
}

// == Put Outcome ==
/// Result of storing a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Put<V> {
    /// Resident in memory and written to storage
    Stored(V),
    /// Resident in memory, but storage stayed full after recovery
    Volatile(V),
    /// Not stored: absent value, or an entry heavier than the bound alone
    Rejected,
}

impl<V> Put<V> {
    /// True unless the value was rejected.
    pub fn is_cached(&self) -> bool {
        !matches!(self, Put::Rejected)
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, Put::Stored(_))
    }

    pub fn value(&self) -> Option<&V> {
        match self {
            Put::Stored(value) | Put::Volatile(value) => Some(value),
            Put::Rejected => None,
        }
    }
}

/// Everything needed to build a [`PersistentLru`].
pub struct PersistOptions<V> {
    pub keys: KeySpace,
    pub storage: Arc<dyn Storage>,
    pub codec: Arc<dyn Codec<V>>,
    pub bound: Bound,
    pub max_age: Option<Duration>,
    pub clock: Arc<dyn Clock>,
    pub flush: DeferredFlush,
}

/// Storage side of the bridge, shared with the engine's disposal hook.
#[derive(Clone)]
struct StorageMirror {
    storage: Arc<dyn Storage>,
    keys: KeySpace,
    flush: DeferredFlush,
}

impl StorageMirror {
    fn try_write(&self, storage_key: &str, raw: &str) -> bool {
        match self.storage.set_item(storage_key, raw) {
            Ok(()) => true,
            Err(err) => {
                debug!(key = storage_key, error = %err, "Storage write failed");
                false
            }
        }
    }

    fn remove_record(&self, key: &str) {
        self.storage.remove_item(&self.keys.item(key));
    }

    /// Mirrors an engine removal. Pending values never had a record.
    fn disposed<V>(&self, key: &str, value: &Cached<V>) {
        self.flush.schedule();
        if !value.is_pending() {
            self.remove_record(key);
        }
    }

    /// Storage keys of every item record in this cache's namespace.
    fn item_records(&self) -> Vec<String> {
        self.storage
            .keys()
            .into_iter()
            .filter(|storage_key| self.keys.item_key_of(storage_key).is_some())
            .collect()
    }
}

// == Persistent LRU ==
/// An LRU engine whose content survives restarts.
pub struct PersistentLru<V> {
    engine: LruEngine<V, StorageWeigher<V>>,
    mirror: StorageMirror,
    codec: Arc<dyn Codec<V>>,
}

impl<V: Clone + Send + 'static> PersistentLru<V> {
    pub fn new(options: PersistOptions<V>) -> Self {
        let PersistOptions {
            keys,
            storage,
            codec,
            bound,
            max_age,
            clock,
            flush,
        } = options;

        let mode = match bound {
            Bound::MaxLength(_) => WeightMode::Length {
                item_prefix_len: keys.item_prefix().chars().count(),
                aged: max_age.is_some(),
            },
            Bound::Capacity(_) | Bound::Unbounded => WeightMode::Count,
        };
        let mirror = StorageMirror {
            storage,
            keys,
            flush,
        };
        let sink = mirror.clone();

        let mut engine =
            LruEngine::with_weigher(bound.max(), StorageWeigher::new(mode, Arc::clone(&codec)))
                .clock(clock)
                .on_dispose(move |key, value| sink.disposed(key, value));
        if let Some(max_age) = max_age {
            engine = engine.max_age(max_age);
        }

        Self {
            engine,
            mirror,
            codec,
        }
    }

    // == Put ==
    /// Stores a ready value and writes its item record.
    ///
    /// Codec failures are returned as errors. A full storage never is: the
    /// value then stays in memory only and [`Put::Volatile`] is returned.
    pub fn put(&mut self, key: &str, value: V) -> Result<Put<V>> {
        let raw = self.codec.stringify(&value)?;
        self.engine.weigher_mut().remember(key, raw);
        let accepted = self.engine.set(key, Cached::Ready(value.clone()));
        let raw = self.engine.weigher_mut().take(key);
        if !accepted? {
            return Ok(Put::Rejected);
        }

        self.mirror.flush.schedule();
        let raw = match raw {
            Some(raw) => raw,
            None => self.codec.stringify(&value)?,
        };
        let storage_key = self.mirror.keys.item(key);
        if self.write(&storage_key, &raw) {
            Ok(Put::Stored(value))
        } else {
            warn!(key, "Storage full after recovery, value kept in memory only");
            self.engine.stats_mut().record_unpersisted_write();
            Ok(Put::Volatile(value))
        }
    }

    /// Stores an in-flight value. It weighs nothing in length mode and is
    /// never written; any record of a previous value is removed.
    pub fn put_pending(&mut self, key: &str, handle: Pending<V>) -> Result<bool> {
        self.engine.weigher_mut().forget(key);
        let accepted = self.engine.set(key, Cached::Pending(handle))?;
        if accepted {
            self.mirror.remove_record(key);
            self.mirror.flush.schedule();
        }
        Ok(accepted)
    }

    /// Replaces the pending value `id` with its result, if it is still the
    /// resident value of `key`.
    pub fn resolve_pending(&mut self, key: &str, id: u64, value: V) -> Result<Put<V>> {
        if !self.holds_pending(key, id) {
            debug!(key, "Pending value was replaced before it resolved");
            return Ok(Put::Rejected);
        }
        self.put(key, value)
    }

    /// Drops the pending value `id` if it is still resident.
    pub fn abandon_pending(&mut self, key: &str, id: u64) -> bool {
        self.holds_pending(key, id) && self.engine.del(key)
    }

    fn holds_pending(&self, key: &str, id: u64) -> bool {
        matches!(self.engine.peek(key), Some(Cached::Pending(handle)) if handle.id() == id)
    }

    // == Get ==
    pub fn get(&mut self, key: &str) -> Option<Cached<V>> {
        let value = self.engine.get(key).cloned();
        if matches!(value, Some(Cached::Ready(_))) {
            self.mirror.flush.schedule();
        }
        value
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.engine.del(key)
    }

    /// Removes every entry, dropping their records in one batch.
    pub fn remove_all(&mut self) {
        let records = self.mirror.item_records();
        self.mirror.storage.remove_items(&records);
        self.engine.reset();
    }

    /// Evicts every stale entry. Returns how many were.
    pub fn prune(&mut self) -> usize {
        self.engine.for_each(|_, _| {})
    }

    // == Manifest ==
    /// Writes the manifest now, dropping any pending deferred flush.
    pub fn flush_manifest(&mut self) -> bool {
        self.mirror.flush.clear();
        self.engine.weigher_mut().clear();
        let Some(raw) = self.manifest_json() else {
            return false;
        };
        let manifest_key = self.mirror.keys.manifest().to_string();
        self.write(&manifest_key, &raw)
    }

    fn manifest_json(&self) -> Option<String> {
        match Manifest::new(self.engine.manifest()).to_json() {
            Ok(raw) => Some(raw),
            Err(err) => {
                warn!(error = %err, "Failed to serialize manifest");
                None
            }
        }
    }

    // == Write With Recovery ==
    /// Writes one record, making room when storage is full.
    ///
    /// Recovery snapshots the entries (which also evicts stale ones), rewrites
    /// the manifest and retries. If that still fails, item records are removed
    /// from the least recently used end, retrying after each removal. Entries
    /// stay in memory. Returns whether the record was written.
    fn write(&mut self, storage_key: &str, raw: &str) -> bool {
        if self.mirror.try_write(storage_key, raw) {
            return true;
        }

        let mut snapshot = Vec::new();
        self.engine
            .for_each(|key, value| snapshot.push((key.to_string(), value.is_pending())));
        if self.retry(storage_key, raw) {
            return true;
        }

        for (key, pending) in snapshot.iter().rev() {
            if *pending {
                continue;
            }
            debug!(key = %key, "Removing item record to free storage");
            self.mirror.remove_record(key);
            if self.retry(storage_key, raw) {
                return true;
            }
        }
        false
    }

    /// Rewrites the manifest, then the record itself unless it was the
    /// manifest.
    fn retry(&self, storage_key: &str, raw: &str) -> bool {
        let manifest_key = self.mirror.keys.manifest();
        let manifest_written = self
            .manifest_json()
            .is_some_and(|manifest| self.mirror.try_write(manifest_key, &manifest));
        manifest_written && (storage_key == manifest_key || self.mirror.try_write(storage_key, raw))
    }

    // == Load ==
    /// Hydrates the engine from storage and heals the stored state.
    ///
    /// Entries whose record is missing or unparsable are dropped, records
    /// not backed by a resident entry are removed, and an existing manifest
    /// is rewritten. Returns how many entries were loaded.
    pub fn load(&mut self) -> Result<usize> {
        let storage = Arc::clone(&self.mirror.storage);
        let stored = storage.get_item(self.mirror.keys.manifest());
        let had_manifest = stored.is_some();
        let manifest = match stored {
            Some(raw) => Manifest::parse(&raw).unwrap_or_else(|err| {
                debug!(error = %err, "Ignoring malformed manifest");
                Manifest::default()
            }),
            None => Manifest::default(),
        };

        let mut data = Vec::with_capacity(manifest.len());
        for (key, marker) in manifest.oldest_first() {
            let Some(raw) = storage.get_item(&self.mirror.keys.item(&key)) else {
                debug!(key = %key, "Dropping entry without item record");
                continue;
            };
            match self.codec.parse(&raw) {
                Ok(value) => {
                    self.engine.weigher_mut().remember(&key, raw);
                    data.push((key, Cached::Ready(value), marker));
                }
                Err(err) => debug!(key = %key, error = %err, "Dropping unparsable item record"),
            }
        }

        let loaded = self.engine.load(data)?;
        self.engine.weigher_mut().clear();
        let orphans = self.prune_storage();
        if had_manifest || !self.engine.is_empty() {
            self.flush_manifest();
        } else {
            self.mirror.flush.clear();
        }
        info!(
            manifest = self.mirror.keys.manifest(),
            loaded,
            resident = self.engine.len(),
            orphans,
            "Cache loaded from storage"
        );
        Ok(loaded)
    }

    /// Removes every item record of this cache with no resident entry.
    fn prune_storage(&self) -> usize {
        let orphans: Vec<String> = self
            .mirror
            .item_records()
            .into_iter()
            .filter(|storage_key| {
                self.mirror
                    .keys
                    .item_key_of(storage_key)
                    .is_some_and(|key| !self.engine.contains(key))
            })
            .collect();
        if !orphans.is_empty() {
            debug!(count = orphans.len(), "Removing orphaned item records");
            self.mirror.storage.remove_items(&orphans);
        }
        orphans.len()
    }

    // == Teardown ==
    /// Cancels the deferred flush and removes every record of this cache.
    pub fn destroy(&mut self) {
        self.mirror.flush.cancel();
        let mut records = self.mirror.item_records();
        records.push(self.mirror.keys.manifest().to_string());
        self.mirror.storage.remove_items(&records);
    }

    /// Writes the manifest and stops flushing, leaving records in place.
    pub fn close(&mut self) {
        self.flush_manifest();
        self.mirror.flush.cancel();
    }

    // == Accessors ==
    pub fn len(&self) -> usize {
        self.engine.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engine.is_empty()
    }

    /// Total weight of resident entries.
    pub fn length(&self) -> usize {
        self.engine.length()
    }

    pub fn keys(&self) -> Vec<String> {
        self.engine.keys()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.engine.contains(key)
    }

    pub fn stats(&self) -> CacheStats {
        self.engine.stats().clone()
    }
}
