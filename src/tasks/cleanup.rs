//! L1 Sweep Task
//!
//! Background task that periodically drops expired L1 entries. Expired
//! entries are also dropped lazily on access; the sweep bounds how long an
//! untouched expired entry keeps occupying the byte budget. L2 expires its
//! own keys.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::service::CacheService;

/// Spawns a background task that sweeps expired L1 entries every
/// `interval_secs` seconds.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_cleanup_task(cache.clone(), 30);
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_cleanup_task(cache: CacheService, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(interval_secs, "starting L1 sweep task");

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.purge_expired_local();
            if removed > 0 {
                info!(removed, "L1 sweep removed expired entries");
            } else {
                debug!("L1 sweep found no expired entries");
            }
        }
    })
}
