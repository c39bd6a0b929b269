//! Cache Statistics Module
//!
//! Per-namespace hit/miss/eviction counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Stats Counters ==
/// Lock-free counters for one namespace. Updated from any task.
#[derive(Debug, Default)]
pub struct StatsCounters {
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    load_errors: AtomicU64,
    capacity_evictions: AtomicU64,
    expirations: AtomicU64,
    explicit_evictions: AtomicU64,
    l2_errors: AtomicU64,
    l2_writes_dropped: AtomicU64,
}

impl StatsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_l1_hit(&self) {
        self.l1_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_hit(&self) {
        self.l2_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Full miss; the loader is about to run.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_error(&self) {
        self.load_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_capacity_eviction(&self) {
        self.capacity_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_explicit_eviction(&self) {
        self.explicit_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_error(&self) {
        self.l2_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_write_dropped(&self) {
        self.l2_writes_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self, namespace: &str, l1_entries: usize) -> CacheStats {
        CacheStats {
            namespace: namespace.to_string(),
            l1_hits: self.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.l2_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            load_errors: self.load_errors.load(Ordering::Relaxed),
            capacity_evictions: self.capacity_evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            explicit_evictions: self.explicit_evictions.load(Ordering::Relaxed),
            l2_errors: self.l2_errors.load(Ordering::Relaxed),
            l2_writes_dropped: self.l2_writes_dropped.load(Ordering::Relaxed),
            l1_entries,
        }
    }
}

// == Cache Stats ==
/// Snapshot of one namespace's counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub namespace: String,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub load_errors: u64,
    pub capacity_evictions: u64,
    pub expirations: u64,
    pub explicit_evictions: u64,
    pub l2_errors: u64,
    pub l2_writes_dropped: u64,
    pub l1_entries: usize,
}

impl CacheStats {
    // == Hit Rate ==
    /// (L1 hits + L2 hits) / all lookups, or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.l1_hits + self.l2_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_starts_at_zero() {
        let stats = StatsCounters::new().snapshot("dict", 0);
        assert_eq!(stats.namespace, "dict");
        assert_eq!(stats.l1_hits + stats.l2_hits + stats.misses, 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_counts_both_tiers() {
        let counters = StatsCounters::new();
        counters.record_l1_hit();
        counters.record_l2_hit();
        counters.record_miss();
        counters.record_miss();
        let stats = counters.snapshot("role", 3);
        assert_eq!(stats.hit_rate(), 0.5);
        assert_eq!(stats.l1_entries, 3);
    }

    #[test]
    fn test_expirations_accumulate() {
        let counters = StatsCounters::new();
        counters.record_expirations(2);
        counters.record_expirations(3);
        assert_eq!(counters.snapshot("menu", 0).expirations, 5);
    }
}
