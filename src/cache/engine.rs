//! LRU Engine Module
//!
//! Bounded in-memory map ordered by recency, with weight-based eviction,
//! optional max age, and a disposal hook fired on every removal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::entry::Entry;
use super::lru::RecencyIndex;
use super::weigher::{UnitWeigher, Weigher};
use super::{CacheStats, Cached};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;

/// Callback fired with every removed entry.
pub type DisposeFn<V> = Box<dyn FnMut(&str, &Cached<V>) + Send>;

// == LRU Engine ==
/// Bounded key/value map evicting least recently used entries.
///
/// The sum of entry weights never exceeds `max`. With a max age, entries
/// older than that are treated as missing and evicted when they are read or
/// visited. Every removal, whatever its cause, goes through the disposal hook.
pub struct LruEngine<V, W = UnitWeigher> {
    entries: HashMap<String, Entry<V>>,
    recency: RecencyIndex,
    /// Upper bound on the total weight
    max: usize,
    /// Maximum entry age in milliseconds
    max_age: Option<i64>,
    /// Total weight of resident entries
    length: usize,
    weigher: W,
    clock: Arc<dyn Clock>,
    on_dispose: Option<DisposeFn<V>>,
    stats: CacheStats,
}

impl<V> LruEngine<V, UnitWeigher> {
    /// Creates an engine holding at most `max` entries.
    pub fn new(max: usize) -> Self {
        Self::with_weigher(max, UnitWeigher)
    }
}

impl<V, W: Weigher<V>> LruEngine<V, W> {
    // == Constructor ==
    /// Creates an engine whose total weight, as computed by `weigher`, stays
    /// at or below `max`.
    pub fn with_weigher(max: usize, weigher: W) -> Self {
        Self {
            entries: HashMap::new(),
            recency: RecencyIndex::new(),
            max,
            max_age: None,
            length: 0,
            weigher,
            clock: Arc::new(SystemClock),
            on_dispose: None,
            stats: CacheStats::new(),
        }
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Installs the disposal hook.
    pub fn on_dispose(mut self, dispose: impl FnMut(&str, &Cached<V>) + Send + 'static) -> Self {
        self.on_dispose = Some(Box::new(dispose));
        self
    }

    // == Set ==
    /// Inserts or replaces `key`.
    ///
    /// Returns `false`, leaving the engine untouched, when the entry alone
    /// weighs more than the bound. Otherwise least recently used entries are
    /// evicted until the bound holds again; the new entry is never one of them.
    pub fn set(&mut self, key: &str, value: Cached<V>) -> Result<bool> {
        let now = self.clock.now_ms();
        self.insert(key, value, now)
    }

    fn insert(&mut self, key: &str, value: Cached<V>, stamp: i64) -> Result<bool> {
        let weight = self.weigher.weigh(key, &value)?;
        if weight > self.max {
            debug!(key, weight, max = self.max, "Entry exceeds the cache bound");
            return Ok(false);
        }

        let previous = self.entries.remove(key).map(|old| {
            self.length -= old.weight;
            old.seq
        });
        let seq = self.recency.touch(key, previous);
        self.length += weight;
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                weight,
                seq,
                stamp,
            },
        );

        self.trim();
        Ok(true)
    }

    /// Evicts from the least recently used end until the bound holds.
    fn trim(&mut self) {
        while self.length > self.max {
            let Some(key) = self.recency.oldest().map(|(_, key)| key.to_string()) else {
                break;
            };
            if self.evict(&key).is_some() {
                self.stats.record_eviction();
                debug!(key = %key, "Evicted least recently used entry");
            }
        }
    }

    // == Get ==
    /// Looks `key` up and marks it most recently used.
    ///
    /// A stale entry is evicted and reported as a miss.
    pub fn get(&mut self, key: &str) -> Option<&Cached<V>> {
        let now = self.clock.now_ms();
        let stale = match self.entries.get(key) {
            Some(entry) => entry.is_stale(now, self.max_age),
            None => {
                self.stats.record_miss();
                return None;
            }
        };
        if stale {
            self.expire(key);
            self.stats.record_miss();
            return None;
        }

        self.stats.record_hit();
        let entry = self.entries.get_mut(key)?;
        entry.seq = self.recency.touch(key, Some(entry.seq));
        if self.max_age.is_some() {
            entry.stamp = now;
        }
        Some(&entry.value)
    }

    /// Looks `key` up without touching recency, age or statistics.
    pub fn peek(&self, key: &str) -> Option<&Cached<V>> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    // == Delete ==
    /// Removes `key`, firing the disposal hook. Returns whether it was resident.
    pub fn del(&mut self, key: &str) -> bool {
        self.evict(key).is_some()
    }

    // == Reset ==
    /// Removes every entry, firing the disposal hook once per entry.
    pub fn reset(&mut self) {
        let keys: Vec<String> = self.recency.iter_mru().map(str::to_string).collect();
        for key in keys.iter().rev() {
            self.evict(key);
        }
    }

    // == For Each ==
    /// Visits entries from most to least recently used.
    ///
    /// Stale entries are evicted instead of visited. Returns how many were.
    pub fn for_each(&mut self, mut visitor: impl FnMut(&str, &Cached<V>)) -> usize {
        let now = self.clock.now_ms();
        let keys: Vec<String> = self.recency.iter_mru().map(str::to_string).collect();
        let mut expired = 0;

        for key in keys {
            let stale = match self.entries.get(&key) {
                Some(entry) => entry.is_stale(now, self.max_age),
                None => continue,
            };
            if stale {
                self.expire(&key);
                expired += 1;
            } else if let Some(entry) = self.entries.get(&key) {
                visitor(&key, &entry.value);
            }
        }
        expired
    }

    // == Manifest ==
    /// Snapshot of the persistable entries as `(key, marker)`, most recently
    /// used first.
    ///
    /// Pending and stale entries are left out. The marker is the entry's
    /// timestamp when a max age is set, its recency sequence otherwise.
    pub fn manifest(&self) -> Vec<(String, i64)> {
        let now = self.clock.now_ms();
        self.recency
            .iter_mru()
            .filter_map(|key| self.entries.get(key).map(|entry| (key, entry)))
            .filter(|(_, entry)| !entry.value.is_pending() && !entry.is_stale(now, self.max_age))
            .map(|(key, entry)| (key.to_string(), self.marker(entry)))
            .collect()
    }

    fn marker(&self, entry: &Entry<V>) -> i64 {
        match self.max_age {
            Some(_) => entry.stamp,
            None => i64::try_from(entry.seq).unwrap_or(i64::MAX),
        }
    }

    // == Load ==
    /// Bulk-loads `(key, value, marker)` triples.
    ///
    /// Entries are inserted oldest marker first (ties keep their input order),
    /// so when the bound is tighter than the data the most recent survive.
    /// With a max age the marker is taken as the entry's timestamp, capped at
    /// the current time, and entries already stale are skipped. Returns how many entries were accepted.
    pub fn load(&mut self, mut data: Vec<(String, Cached<V>, i64)>) -> Result<usize> {
        let now = self.clock.now_ms();
        data.sort_by_key(|(_, _, marker)| *marker);

        let mut loaded = 0;
        for (key, value, marker) in data {
            let stamp = match self.max_age {
                Some(max_age) if now.saturating_sub(marker) > max_age => {
                    debug!(key = %key, "Skipping stale entry on load");
                    continue;
                }
                // A marker from the future ages from now
                Some(_) => marker.min(now),
                None => now,
            };
            if self.insert(&key, value, stamp)? {
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// Removes an entry and hands it to the disposal hook.
    fn evict(&mut self, key: &str) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(entry.seq);
        self.length -= entry.weight;
        if let Some(dispose) = self.on_dispose.as_mut() {
            dispose(key, &entry.value);
        }
        Some(entry)
    }

    fn expire(&mut self, key: &str) {
        if self.evict(key).is_some() {
            self.stats.record_expiration();
            debug!(key, "Dropped stale entry");
        }
    }

    // == Accessors ==
    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total weight of resident entries.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn is_aged(&self) -> bool {
        self.max_age.is_some()
    }

    /// Keys from most to least recently used, stale or not.
    pub fn keys(&self) -> Vec<String> {
        self.recency.iter_mru().map(str::to_string).collect()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut CacheStats {
        &mut self.stats
    }

    pub fn weigher_mut(&mut self) -> &mut W {
        &mut self.weigher
    }
}
