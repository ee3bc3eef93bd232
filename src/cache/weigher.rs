//! Entry weight functions.
//!
//! The engine asks its weigher how much of the bound each entry consumes.

use std::collections::HashMap;
use std::sync::Arc;

use super::Cached;
use crate::codec::Codec;
use crate::error::Result;

/// Characters one manifest line adds on top of the key itself: `"":,`
pub const MANIFEST_SEPARATOR_LEN: usize = 4;

/// Characters reserved for an epoch-millisecond timestamp in the manifest.
pub const MANIFEST_TIMESTAMP_LEN: usize = 13;

// == Weigher Trait ==
pub trait Weigher<V>: Send {
    /// Returns the bound-consuming cost of `value` stored under `key`.
    fn weigh(&mut self, key: &str, value: &Cached<V>) -> Result<usize>;
}

/// Constant weight of one per entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnitWeigher;

impl<V> Weigher<V> for UnitWeigher {
    fn weigh(&mut self, _key: &str, _value: &Cached<V>) -> Result<usize> {
        Ok(1)
    }
}

// == Storage Weigher ==
/// How a [`StorageWeigher`] counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightMode {
    /// One per entry, pending or not
    Count,
    /// Characters the entry occupies in storage
    Length {
        /// Length of the item key prefix, e.g. `ns.id.i.`
        item_prefix_len: usize,
        /// Whether manifest markers are timestamps
        aged: bool,
    },
}

/// Weigher used by persistent caches.
///
/// In length mode an entry weighs its serialized value, its item storage key
/// and its manifest line. The write path hands in the serialized string it is
/// about to store with [`remember`](Self::remember) so it is not computed
/// twice; pending values weigh nothing.
pub struct StorageWeigher<V> {
    mode: WeightMode,
    codec: Arc<dyn Codec<V>>,
    memo: HashMap<String, String>,
}

impl<V> StorageWeigher<V> {
    pub fn new(mode: WeightMode, codec: Arc<dyn Codec<V>>) -> Self {
        Self {
            mode,
            codec,
            memo: HashMap::new(),
        }
    }

    pub fn mode(&self) -> WeightMode {
        self.mode
    }

    /// Records the serialized form of the value about to be weighed.
    pub fn remember(&mut self, key: &str, raw: String) {
        self.memo.insert(key.to_string(), raw);
    }

    /// Hands out (and forgets) the memoized serialization of `key`.
    pub fn take(&mut self, key: &str) -> Option<String> {
        self.memo.remove(key)
    }

    pub fn forget(&mut self, key: &str) {
        self.memo.remove(key);
    }

    pub fn clear(&mut self) {
        self.memo.clear();
    }
}

impl<V> Weigher<V> for StorageWeigher<V> {
    fn weigh(&mut self, key: &str, value: &Cached<V>) -> Result<usize> {
        let (item_prefix_len, aged) = match self.mode {
            WeightMode::Count => return Ok(1),
            WeightMode::Length {
                item_prefix_len,
                aged,
            } => (item_prefix_len, aged),
        };
        let Cached::Ready(value) = value else {
            return Ok(0);
        };

        let raw_len = match self.memo.get(key) {
            Some(raw) => raw.chars().count(),
            None => self.codec.stringify(value)?.chars().count(),
        };

        let key_len = key.chars().count();
        Ok(raw_len
            + item_prefix_len
            + key_len
            + key_len
            + MANIFEST_SEPARATOR_LEN
            + if aged { MANIFEST_TIMESTAMP_LEN } else { 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::pending;
    use crate::codec::JsonCodec;

    fn length_weigher(aged: bool) -> StorageWeigher<String> {
        StorageWeigher::new(
            WeightMode::Length {
                item_prefix_len: "ns.testCache.i.".len(),
                aged,
            },
            Arc::new(JsonCodec::new()),
        )
    }

    #[test]
    fn test_unit_weigher() {
        let mut weigher = UnitWeigher;
        assert_eq!(
            Weigher::<u8>::weigh(&mut weigher, "k", &Cached::Ready(9)).unwrap(),
            1
        );
    }

    #[test]
    fn test_count_mode_counts_pending_too() {
        let mut weigher =
            StorageWeigher::<String>::new(WeightMode::Count, Arc::new(JsonCodec::new()));
        let (_resolver, handle) = pending();
        assert_eq!(weigher.weigh("k", &Cached::Pending(handle)).unwrap(), 1);
    }

    #[test]
    fn test_length_mode_formula() {
        let mut weigher = length_weigher(false);
        // "value" serializes to 7 chars, item key "ns.testCache.i.key" is 18,
        // manifest line adds "key" plus 4 separators
        let weight = weigher.weigh("key", &Cached::Ready("value".to_string())).unwrap();
        assert_eq!(weight, 7 + 18 + 3 + 4);
    }

    #[test]
    fn test_length_mode_reserves_timestamp_when_aged() {
        let mut plain = length_weigher(false);
        let mut aged = length_weigher(true);
        let value = Cached::Ready("value".to_string());

        assert_eq!(
            aged.weigh("key", &value).unwrap() - plain.weigh("key", &value).unwrap(),
            13
        );
    }

    #[test]
    fn test_length_mode_pending_weighs_nothing() {
        let mut weigher = length_weigher(true);
        let (_resolver, handle) = pending();
        assert_eq!(weigher.weigh("key", &Cached::Pending(handle)).unwrap(), 0);
    }

    #[test]
    fn test_memo_is_reused_and_taken_once() {
        let mut weigher = length_weigher(false);
        weigher.remember("key", "\"cached\"".to_string());

        // The memoized string wins over a fresh serialization
        let weight = weigher.weigh("key", &Cached::Ready("x".to_string())).unwrap();
        assert_eq!(weight, 8 + 18 + 3 + 4);

        assert_eq!(weigher.take("key"), Some("\"cached\"".to_string()));
        assert_eq!(weigher.take("key"), None);
    }

    #[test]
    fn test_weigh_without_memo_serializes_fresh() {
        let mut weigher = length_weigher(false);
        let short = weigher.weigh("key", &Cached::Ready("v".to_string())).unwrap();
        let long = weigher.weigh("key", &Cached::Ready("vvvv".to_string())).unwrap();

        assert_eq!(long - short, 3);
        assert_eq!(weigher.take("key"), None);
    }
}
