//! L1 Expiry Sweep
//!
//! Background task that periodically drops expired L1 entries. Expiry is
//! otherwise lazy, so namespaces that are rarely read would keep dead
//! entries until capacity pressure pushed them out.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::TwoTierCache;

/// Spawns a background task that purges expired L1 entries every
/// `cleanup_interval_secs` seconds.
///
/// The returned handle is aborted during graceful shutdown.
///
/// # Example
/// ```ignore
/// let engine = Arc::new(TwoTierCache::local(registry));
/// let cleanup_handle = spawn_cleanup_task(engine.clone(), 30);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(engine: Arc<TwoTierCache>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting L1 expiry sweep with interval of {} seconds",
            cleanup_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = engine.purge_expired().await;
            if removed > 0 {
                info!("L1 expiry sweep: removed {} expired entries", removed);
            } else {
                debug!("L1 expiry sweep: no expired entries found");
            }
        }
    })
}
