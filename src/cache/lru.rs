//! LRU Recency Index Module
//!
//! Implements Least Recently Used ordering for cache eviction.

use std::collections::BTreeMap;

// == Recency Index ==
/// Orders keys by access recency.
///
/// Every touch hands out a fresh, strictly increasing sequence number, so the
/// order is total and ties are broken by insertion order:
/// - Lowest sequence = Least recently used
/// - Highest sequence = Most recently used
#[derive(Debug, Default)]
pub struct RecencyIndex {
    /// Keys by sequence number
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl RecencyIndex {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used and returns its new sequence number.
    ///
    /// `previous` is the sequence the key held before, if it was tracked.
    pub fn touch(&mut self, key: &str, previous: Option<u64>) -> u64 {
        if let Some(seq) = previous {
            self.order.remove(&seq);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.to_string());
        seq
    }

    // == Remove ==
    /// Forgets the key tracked under `seq`.
    pub fn remove(&mut self, seq: u64) -> Option<String> {
        self.order.remove(&seq)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn oldest(&self) -> Option<(u64, &str)> {
        self.order
            .iter()
            .next()
            .map(|(seq, key)| (*seq, key.as_str()))
    }

    /// Keys from most to least recently used.
    pub fn iter_mru(&self) -> impl Iterator<Item = &str> {
        self.order.values().rev().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn mru(index: &RecencyIndex) -> Vec<&str> {
        index.iter_mru().collect()
    }

    #[test]
    fn test_index_new() {
        let index = RecencyIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.oldest(), None);
    }

    #[test]
    fn test_touch_new_keys() {
        let mut index = RecencyIndex::new();

        index.touch("key1", None);
        index.touch("key2", None);
        index.touch("key3", None);

        assert_eq!(index.len(), 3);
        // key1 is oldest (added first)
        assert_eq!(index.oldest(), Some((0, "key1")));
        assert_eq!(mru(&index), vec!["key3", "key2", "key1"]);
    }

    #[test]
    fn test_touch_existing_key_moves_to_front() {
        let mut index = RecencyIndex::new();

        let seq1 = index.touch("key1", None);
        index.touch("key2", None);
        index.touch("key3", None);

        let seq1 = index.touch("key1", Some(seq1));

        assert_eq!(seq1, 3);
        assert_eq!(index.len(), 3);
        assert_eq!(index.oldest().map(|(_, k)| k), Some("key2"));
        assert_eq!(mru(&index), vec!["key1", "key3", "key2"]);
    }

    #[test]
    fn test_remove() {
        let mut index = RecencyIndex::new();

        index.touch("a", None);
        let seq_b = index.touch("b", None);
        index.touch("c", None);

        assert_eq!(index.remove(seq_b), Some("b".to_string()));
        assert_eq!(index.remove(seq_b), None);
        assert_eq!(mru(&index), vec!["c", "a"]);
    }

    #[test]
    fn test_order_after_multiple_touches() {
        let mut index = RecencyIndex::new();

        let a = index.touch("a", None);
        let b = index.touch("b", None);
        let c = index.touch("c", None);

        let _a = index.touch("a", Some(a));
        let _c = index.touch("c", Some(c));
        let _b = index.touch("b", Some(b));

        // Least recent first: a, c, b
        assert_eq!(mru(&index), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_clear_keeps_sequence_monotonic() {
        let mut index = RecencyIndex::new();
        index.touch("a", None);
        index.clear();

        assert!(index.is_empty());
        assert_eq!(index.touch("b", None), 1);
    }
}
