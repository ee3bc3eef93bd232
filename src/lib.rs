//! Store LRU - A persistent, size-bounded LRU cache
//!
//! Keeps named caches in memory with least-recently-used eviction and writes
//! them back to a key/value storage backend, so they survive restarts.

pub mod cache;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod facade;
pub mod persist;
pub mod registry;
pub mod storage;
pub mod tasks;

pub use cache::{Cached, CacheStats, Pending};
pub use codec::{Codec, JsonCodec};
pub use config::Config;
pub use error::{CacheError, Result, StorageError};
pub use facade::{Cache, CacheInfo, CacheOptions};
pub use persist::{Bound, Put};
pub use registry::CacheRegistry;
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use tasks::spawn_prune_task;
