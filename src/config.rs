//! Configuration Module
//!
//! Handles loading process-level defaults from environment variables.
//! Per-cache settings live in [`CacheOptions`](crate::CacheOptions).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default namespace prepended to every cache id in storage keys.
pub const DEFAULT_NAMESPACE: &str = "store_lru.";

/// Default storage quota in characters (the usual 5 MB browser budget).
pub const DEFAULT_STORAGE_QUOTA: usize = 5 * 1024 * 1024;

/// Process configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Prefix for all storage keys written by caches of this process
    pub namespace: String,
    /// Location of the file-backed storage
    pub storage_path: PathBuf,
    /// Maximum characters the file-backed storage accepts
    pub storage_quota: usize,
    /// Background prune interval in seconds
    pub prune_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `STORE_LRU_NAMESPACE` - Storage key namespace (default: `store_lru.`)
    /// - `STORE_LRU_STORAGE_PATH` - Storage file (default: `store_lru.json`)
    /// - `STORE_LRU_STORAGE_QUOTA` - Storage quota in chars (default: 5 MiB)
    /// - `STORE_LRU_PRUNE_INTERVAL` - Prune frequency in seconds (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            namespace: env::var("STORE_LRU_NAMESPACE").unwrap_or(defaults.namespace),
            storage_path: env::var("STORE_LRU_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_path),
            storage_quota: env::var("STORE_LRU_STORAGE_QUOTA")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.storage_quota),
            prune_interval: env::var("STORE_LRU_PRUNE_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.prune_interval),
        }
    }

    /// Interval of the background prune task.
    pub fn prune_every(&self) -> Duration {
        Duration::from_secs(self.prune_interval)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            storage_path: PathBuf::from("store_lru.json"),
            storage_quota: DEFAULT_STORAGE_QUOTA,
            prune_interval: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.namespace, "store_lru.");
        assert_eq!(config.storage_path, PathBuf::from("store_lru.json"));
        assert_eq!(config.storage_quota, 5 * 1024 * 1024);
        assert_eq!(config.prune_interval, 60);
        assert_eq!(config.prune_every(), Duration::from_secs(60));
    }

    #[test]
    fn test_config_prune_every_follows_interval() {
        let config = Config {
            prune_interval: 5,
            ..Config::default()
        };
        assert_eq!(config.prune_every(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("STORE_LRU_NAMESPACE");
        env::remove_var("STORE_LRU_STORAGE_PATH");
        env::remove_var("STORE_LRU_STORAGE_QUOTA");
        env::remove_var("STORE_LRU_PRUNE_INTERVAL");

        let config = Config::from_env();
        assert_eq!(config.namespace, "store_lru.");
        assert_eq!(config.storage_quota, DEFAULT_STORAGE_QUOTA);
        assert_eq!(config.prune_interval, 60);
    }
}
