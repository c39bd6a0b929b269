//! Cache Entry Module
//!
//! In-process (L1) entries with write and access expiry.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Type-erased cached value. Namespaces hold values of different types;
/// readers downcast back to the type they asked for.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

// == Cache Entry ==
/// A single L1 entry with its expiry metadata.
///
/// Reads only ever hold a shared reference, so the access bookkeeping is
/// atomic.
pub struct CacheEntry {
    /// The stored value
    pub value: CachedValue,
    /// When the entry was written
    pub created_at: Instant,
    /// Hard deadline derived from the write TTL
    pub expires_at: Instant,
    /// Idle timeout, if any
    pub ttl_access: Option<Duration>,
    /// Nanoseconds from `created_at` to the last successful read
    last_access: AtomicU64,
    /// Segment clock value at the last insert or read; smallest is LRU
    recency: AtomicU64,
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("last_access", &self.last_access())
            .field("ttl_access", &self.ttl_access)
            .finish_non_exhaustive()
    }
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry that expires `ttl_write` after now, or earlier if
    /// left idle for `ttl_access`.
    pub fn new(
        value: CachedValue,
        ttl_write: Duration,
        ttl_access: Option<Duration>,
        tick: u64,
    ) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            expires_at: now + ttl_write,
            ttl_access,
            last_access: AtomicU64::new(0),
            recency: AtomicU64::new(tick),
        }
    }

    pub fn last_access(&self) -> Instant {
        self.created_at + Duration::from_nanos(self.last_access.load(Ordering::Relaxed))
    }

    pub fn recency(&self) -> u64 {
        self.recency.load(Ordering::Relaxed)
    }

    // == Is Expired ==
    /// An entry is expired once either deadline has been reached.
    ///
    /// Boundary condition: reaching the deadline exactly counts as expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        if now >= self.expires_at {
            return true;
        }
        match self.ttl_access {
            Some(idle) => now >= self.last_access() + idle,
            None => false,
        }
    }

    // == Touch ==
    /// Records a read at `now`, pushing the idle deadline forward and
    /// stamping the entry with `tick` for LRU ordering.
    pub fn touch(&self, now: Instant, tick: u64) {
        let offset = now.saturating_duration_since(self.created_at).as_nanos();
        self.last_access
            .fetch_max(u64::try_from(offset).unwrap_or(u64::MAX), Ordering::Relaxed);
        self.recency.fetch_max(tick, Ordering::Relaxed);
    }

    // == Time To Live ==
    /// Time left before the entry expires, zero if already expired.
    pub fn ttl_remaining(&self) -> Duration {
        let now = Instant::now();
        let mut deadline = self.expires_at;
        if let Some(idle) = self.ttl_access {
            deadline = deadline.min(self.last_access() + idle);
        }
        deadline.saturating_duration_since(now)
    }

    /// Downcasts the stored value to `V` and clones it out.
    pub fn value_as<V: Clone + 'static>(&self) -> Option<V> {
        self.value.downcast_ref::<V>().cloned()
    }
}
