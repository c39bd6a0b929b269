//! Asynchronous L2 Writer
//!
//! Bounded worker pool that takes shared-tier writes off the read path.
//! Submission never blocks: when the queue is full the write is dropped
//! and counted, which only costs a later L2 miss.
//!
//! Evictions and queued writes meet at a [`WriteFence`]: every job carries
//! the fence epoch of its key at enqueue time, and an eviction advances
//! that epoch, so a write queued before an eviction can never land after
//! it.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::l2::L2Store;
use crate::cache::StatsCounters;

/// Lock stripes in a [`WriteFence`].
const FENCE_STRIPES: usize = 64;

// == Write Fence ==
#[derive(Debug, Default)]
struct FenceStripe {
    gate: tokio::sync::Mutex<()>,
    epoch: AtomicU64,
}

/// Striped epochs ordering L2 deletes against queued L2 sets.
///
/// A stripe covers every key hashing to it, so an eviction may also drop
/// an unrelated pending write from the same stripe; that costs a later L2
/// miss, never a stale read.
#[derive(Debug)]
pub struct WriteFence {
    stripes: Vec<FenceStripe>,
}

impl Default for WriteFence {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteFence {
    pub fn new() -> Self {
        Self {
            stripes: (0..FENCE_STRIPES).map(|_| FenceStripe::default()).collect(),
        }
    }

    fn stripe(&self, key: &str) -> &FenceStripe {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.stripes[(hasher.finish() % self.stripes.len() as u64) as usize]
    }

    /// Epoch to stamp on a write for `key` queued now.
    pub fn epoch(&self, key: &str) -> u64 {
        self.stripe(key).epoch.load(Ordering::Acquire)
    }

    /// Invalidates every queued write for `key`. Hold the guard until the
    /// L2 delete has finished; writes for the stripe wait on it.
    pub async fn close(&self, key: &str) -> MutexGuard<'_, ()> {
        let stripe = self.stripe(key);
        let guard = stripe.gate.lock().await;
        stripe.epoch.fetch_add(1, Ordering::AcqRel);
        guard
    }

    /// Closes every stripe, in order, for namespace-wide deletes.
    pub async fn close_all(&self) -> Vec<MutexGuard<'_, ()>> {
        let mut guards = Vec::with_capacity(self.stripes.len());
        for stripe in &self.stripes {
            let guard = stripe.gate.lock().await;
            stripe.epoch.fetch_add(1, Ordering::AcqRel);
            guards.push(guard);
        }
        guards
    }

    /// Locks the stripe of `key` if `epoch` is still current.
    async fn admit(&self, key: &str, epoch: u64) -> Option<MutexGuard<'_, ()>> {
        let stripe = self.stripe(key);
        let guard = stripe.gate.lock().await;
        (stripe.epoch.load(Ordering::Acquire) == epoch).then_some(guard)
    }
}

// == Write Job ==
/// One pending `set` against the shared tier.
#[derive(Debug)]
pub struct L2WriteJob {
    pub key: String,
    pub bytes: Vec<u8>,
    pub ttl: Duration,
    /// Fence epoch of `key` when the job was queued
    pub epoch: u64,
    /// Counters of the namespace the key belongs to
    pub stats: Arc<StatsCounters>,
}

// == Write Pool ==
pub struct L2WritePool {
    sender: RwLock<Option<mpsc::Sender<L2WriteJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl L2WritePool {
    /// Starts `workers` tasks draining a queue of `queue_size` jobs.
    ///
    /// Each write is bounded by `write_timeout`; failures and timeouts are
    /// logged and dropped, never retried.
    pub fn spawn(
        store: Arc<dyn L2Store>,
        fence: Arc<WriteFence>,
        workers: usize,
        queue_size: usize,
        write_timeout: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<L2WriteJob>(queue_size.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let store = Arc::clone(&store);
                let fence = Arc::clone(&fence);
                tokio::spawn(async move {
                    loop {
                        let job = { rx.lock().await.recv().await };
                        let Some(job) = job else { break };
                        write_one(store.as_ref(), &fence, job, write_timeout).await;
                    }
                    debug!(worker, "L2 writer stopped");
                })
            })
            .collect();

        Self {
            sender: RwLock::new(Some(tx)),
            workers: Mutex::new(handles),
        }
    }

    /// Queues a write. Returns false when the write was dropped because
    /// the queue is full or the pool is shut down.
    pub fn submit(&self, job: L2WriteJob) -> bool {
        let guard = self.sender.read().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = guard.as_ref() else {
            job.stats.record_l2_write_dropped();
            debug!(key = %job.key, "L2 writer closed, write dropped");
            return false;
        };

        match sender.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job))
            | Err(mpsc::error::TrySendError::Closed(job)) => {
                job.stats.record_l2_write_dropped();
                warn!(key = %job.key, "L2 write queue full, write dropped");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    // == Shutdown ==
    /// Stops accepting writes and waits up to `grace` for queued writes to
    /// drain. Workers still running after that are aborted.
    pub async fn shutdown(&self, grace: Duration) {
        self.sender
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        let mut handles: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        let drained = tokio::time::timeout(grace, async {
            for handle in handles.iter_mut() {
                let _ = handle.await;
            }
        })
        .await;

        match drained {
            Ok(()) => info!("L2 writer drained"),
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "L2 writer did not drain in time, aborting");
                for handle in &handles {
                    handle.abort();
                }
            }
        }
    }
}

async fn write_one(
    store: &dyn L2Store,
    fence: &WriteFence,
    job: L2WriteJob,
    write_timeout: Duration,
) {
    let Some(_gate) = fence.admit(&job.key, job.epoch).await else {
        job.stats.record_l2_write_dropped();
        debug!(key = %job.key, "L2 write superseded by an eviction, dropped");
        return;
    };
    match tokio::time::timeout(write_timeout, store.set(&job.key, job.bytes, job.ttl)).await {
        Ok(Ok(())) => debug!(key = %job.key, backend = store.backend(), "L2 write done"),
        Ok(Err(e)) => {
            job.stats.record_l2_error();
            warn!(key = %job.key, error = %e, "L2 write failed");
        }
        Err(_) => {
            job.stats.record_l2_error();
            warn!(key = %job.key, timeout_ms = write_timeout.as_millis() as u64, "L2 write timed out");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::l2::MemoryL2;

    fn job(key: &str, epoch: u64, stats: &Arc<StatsCounters>) -> L2WriteJob {
        L2WriteJob {
            key: key.to_string(),
            bytes: vec![1, 2, 3],
            ttl: Duration::from_secs(60),
            epoch,
            stats: Arc::clone(stats),
        }
    }

    fn pool(
        store: &Arc<MemoryL2>,
        fence: &Arc<WriteFence>,
        workers: usize,
        queue: usize,
    ) -> L2WritePool {
        L2WritePool::spawn(
            store.clone(),
            Arc::clone(fence),
            workers,
            queue,
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn test_writes_land_and_shutdown_drains() {
        let store = Arc::new(MemoryL2::new());
        let fence = Arc::new(WriteFence::new());
        let pool = pool(&store, &fence, 2, 16);
        let stats = Arc::new(StatsCounters::new());

        for i in 0..10 {
            let key = format!("k:{}", i);
            assert!(pool.submit(job(&key, fence.epoch(&key), &stats)));
        }
        pool.shutdown(Duration::from_secs(2)).await;

        assert_eq!(store.len().await, 10);
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_dropped() {
        let store = Arc::new(MemoryL2::new());
        let fence = Arc::new(WriteFence::new());
        let pool = pool(&store, &fence, 1, 4);
        pool.shutdown(Duration::from_secs(1)).await;

        let stats = Arc::new(StatsCounters::new());
        assert!(!pool.submit(job("late", 0, &stats)));
        assert_eq!(stats.snapshot("t", 0).l2_writes_dropped, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_write_queued_before_close_is_dropped() {
        let store = Arc::new(MemoryL2::new());
        let fence = Arc::new(WriteFence::new());
        let pool = pool(&store, &fence, 1, 4);
        let stats = Arc::new(StatsCounters::new());

        let stale = fence.epoch("dict:5");
        {
            let _gate = fence.close("dict:5").await;
            assert!(pool.submit(job("dict:5", stale, &stats)));
        }
        assert!(pool.submit(job("dict:6", fence.epoch("dict:6"), &stats)));
        pool.shutdown(Duration::from_secs(2)).await;

        assert!(!store.contains("dict:5").await);
        assert!(store.contains("dict:6").await);
        assert_eq!(stats.snapshot("t", 0).l2_writes_dropped, 1);
    }

    #[tokio::test]
    async fn test_close_all_advances_every_epoch() {
        let fence = WriteFence::new();
        let keys = ["a", "b", "dict:code:sex"];
        let before: Vec<u64> = keys.iter().map(|k| fence.epoch(k)).collect();
        drop(fence.close_all().await);
        for (key, old) in keys.iter().zip(before) {
            assert_eq!(fence.epoch(key), old + 1);
        }
    }
}
