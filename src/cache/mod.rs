//! Cache Module
//!
//! In-memory LRU engine with weight-bounded eviction and max-age expiry.

mod engine;
mod entry;
mod lru;
mod stats;
mod weigher;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use engine::{DisposeFn, LruEngine};
pub use entry::{pending, Cached, Pending, Resolver};
pub use lru::RecencyIndex;
pub use stats::CacheStats;
pub use weigher::{
    StorageWeigher, UnitWeigher, Weigher, WeightMode, MANIFEST_SEPARATOR_LEN,
    MANIFEST_TIMESTAMP_LEN,
};
