//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the engine against a plain model of LRU behavior.

use proptest::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::cache::{Cached, LruEngine, StorageWeigher, WeightMode};
use crate::codec::JsonCodec;

// == Test Configuration ==
const TEST_CAPACITY: usize = 5;
const TEST_ITEM_PREFIX: &str = "store_lru.prop.i.";

// == Strategies ==
/// Small key space so operations collide often
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-h]{1,2}".prop_map(|s| s)
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{0,40}".prop_map(|s| s)
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        3 => (key_strategy(), value_strategy())
            .prop_map(|(key, value)| CacheOp::Set { key, value }),
        2 => key_strategy().prop_map(|key| CacheOp::Get { key }),
        1 => key_strategy().prop_map(|key| CacheOp::Delete { key }),
    ]
}

fn length_engine(max: usize) -> LruEngine<String, StorageWeigher<String>> {
    let mode = WeightMode::Length {
        item_prefix_len: TEST_ITEM_PREFIX.len(),
        aged: false,
    };
    LruEngine::with_weigher(max, StorageWeigher::new(mode, Arc::new(JsonCodec::new())))
}

fn ready_value<W: crate::cache::Weigher<String>>(
    engine: &mut LruEngine<String, W>,
    key: &str,
) -> Option<String> {
    engine.get(key).and_then(|value| value.ready().cloned())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Without a binding bound, a read returns exactly the last value written.
    #[test]
    fn prop_last_put_wins(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let mut engine = LruEngine::new(usize::MAX);
        let mut model: HashMap<String, String> = HashMap::new();

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    prop_assert!(engine.set(&key, Cached::Ready(value.clone())).unwrap());
                    model.insert(key, value);
                }
                CacheOp::Get { key } => {
                    prop_assert_eq!(ready_value(&mut engine, &key), model.get(&key).cloned());
                }
                CacheOp::Delete { key } => {
                    prop_assert_eq!(engine.del(&key), model.remove(&key).is_some());
                }
            }
        }
        prop_assert_eq!(engine.len(), model.len());
    }

    // The engine evicts exactly like a recency list truncated at capacity.
    #[test]
    fn prop_lru_order_matches_model(ops in prop::collection::vec(cache_op_strategy(), 1..120)) {
        let mut engine = LruEngine::new(TEST_CAPACITY);
        // Front is most recently used
        let mut model: VecDeque<String> = VecDeque::new();

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    engine.set(&key, Cached::Ready(value)).unwrap();
                    model.retain(|k| k != &key);
                    model.push_front(key);
                    model.truncate(TEST_CAPACITY);
                }
                CacheOp::Get { key } => {
                    let hit = engine.get(&key).is_some();
                    let position = model.iter().position(|k| k == &key);
                    prop_assert_eq!(hit, position.is_some());
                    if let Some(position) = position {
                        if let Some(k) = model.remove(position) {
                            model.push_front(k);
                        }
                    }
                }
                CacheOp::Delete { key } => {
                    engine.del(&key);
                    model.retain(|k| k != &key);
                }
            }
            prop_assert!(engine.len() <= TEST_CAPACITY);
            prop_assert_eq!(engine.keys(), model.iter().cloned().collect::<Vec<_>>());
        }
    }

    // Total weight never exceeds the bound, and a rejected entry changes nothing.
    #[test]
    fn prop_length_bound_holds(
        max in 40usize..200,
        ops in prop::collection::vec(cache_op_strategy(), 1..80),
    ) {
        let mut engine = length_engine(max);

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    let keys_before = engine.keys();
                    let length_before = engine.length();
                    let accepted = engine.set(&key, Cached::Ready(value.clone())).unwrap();
                    if accepted {
                        let keys_after = engine.keys();
                        prop_assert_eq!(keys_after.first(), Some(&key));
                    } else {
                        prop_assert_eq!(engine.keys(), keys_before);
                        prop_assert_eq!(engine.length(), length_before);
                    }
                }
                CacheOp::Get { key } => {
                    engine.get(&key);
                }
                CacheOp::Delete { key } => {
                    engine.del(&key);
                }
            }
            prop_assert!(engine.length() <= max);
        }
    }

    // Every read is counted once, as a hit or a miss.
    #[test]
    fn prop_stats_count_every_read(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let mut engine = LruEngine::new(TEST_CAPACITY);
        let mut reads = 0u64;
        let mut hits = 0u64;

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    engine.set(&key, Cached::Ready(value)).unwrap();
                }
                CacheOp::Get { key } => {
                    reads += 1;
                    if engine.get(&key).is_some() {
                        hits += 1;
                    }
                }
                CacheOp::Delete { key } => {
                    engine.del(&key);
                }
            }
        }

        let stats = engine.stats();
        prop_assert_eq!(stats.hits, hits);
        prop_assert_eq!(stats.hits + stats.misses, reads);
    }
}
