//! Prune Task
//!
//! Background task that periodically evicts stale entries of an aged cache,
//! so their records leave storage without waiting to be read.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::facade::Cache;

/// Spawns a background task that prunes `cache` every `interval`.
///
/// The task stops by itself once the cache is destroyed or closed; the
/// returned handle can abort it earlier.
///
/// # Example
/// ```ignore
/// let cache = registry.create::<String>("users", options)?;
/// let prune_handle = spawn_prune_task(cache.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// prune_handle.abort();
/// ```
pub fn spawn_prune_task<V>(cache: Cache<V>, interval: Duration) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(id = cache.id(), ?interval, "Starting prune task");

        loop {
            tokio::time::sleep(interval).await;

            if cache.is_destroyed() {
                debug!(id = cache.id(), "Cache gone, stopping prune task");
                break;
            }

            let removed = cache.prune();
            if removed > 0 {
                info!(id = cache.id(), removed, "Pruned stale entries");
            } else {
                debug!(id = cache.id(), "Prune found no stale entries");
            }
        }
    })
}
