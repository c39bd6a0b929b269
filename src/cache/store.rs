//! L1 Segment Module
//!
//! One bounded in-process map per namespace. Storage is a sharded
//! `DashMap`, so a hit only takes a shard read lock; recency and idle time
//! are stamped on the entry atomically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::cache::entry::{CacheEntry, CachedValue};
use crate::cache::StatsCounters;

// == L1 Segment ==
/// Bounded LRU map with TTL expiry for a single namespace.
#[derive(Debug)]
pub struct L1Segment {
    /// Rendered key -> entry
    entries: DashMap<String, CacheEntry>,
    /// Monotonic clock handing out recency ticks
    clock: AtomicU64,
    /// Serializes inserts so the capacity check and the victim removal
    /// see the same map. Reads never take it.
    insert_lock: Mutex<()>,
    /// Namespace counters, shared with the engine
    stats: Arc<StatsCounters>,
    /// Maximum number of entries allowed
    capacity: usize,
    ttl_write: Duration,
    ttl_access: Option<Duration>,
}

impl L1Segment {
    // == Constructor ==
    pub fn new(
        capacity: usize,
        ttl_write: Duration,
        ttl_access: Option<Duration>,
        stats: Arc<StatsCounters>,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            clock: AtomicU64::new(0),
            insert_lock: Mutex::new(()),
            stats,
            capacity,
            ttl_write,
            ttl_access,
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    // == Insert ==
    /// Stores a value, resetting its TTL if the key already exists.
    ///
    /// If the segment is full, the least recently used entry is evicted.
    pub fn insert(&self, key: String, value: CachedValue) {
        let _guard = self.insert_lock.lock().unwrap_or_else(|e| e.into_inner());

        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            if let Some(victim) = self.least_recent() {
                self.entries.remove(&victim);
                self.stats.record_capacity_eviction();
            }
        }

        let entry = CacheEntry::new(value, self.ttl_write, self.ttl_access, self.tick());
        self.entries.insert(key, entry);
    }

    /// Key with the smallest recency tick. Linear in the segment size, and
    /// only reached on inserts into a full segment.
    fn least_recent(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|entry| entry.value().recency())
            .map(|entry| entry.key().clone())
    }

    // == Get ==
    /// Returns the value if present and fresh.
    ///
    /// Expired entries are dropped on the spot and reported as absent.
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired_at(now) {
                entry.touch(now, self.tick());
                return Some(Arc::clone(&entry.value));
            }
        }

        // Re-checked under the shard write lock: a fresh entry written in
        // between must survive.
        if self
            .entries
            .remove_if(key, |_, entry| entry.is_expired_at(now))
            .is_some()
        {
            self.stats.record_expirations(1);
        }
        None
    }

    /// Returns the value without touching LRU order or idle time.
    pub fn peek(&self, key: &str) -> Option<CachedValue> {
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| Arc::clone(&entry.value))
    }

    // == Remove ==
    /// Removes an entry; returns whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    // == Clear ==
    /// Drops every entry; returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, _| {
            removed += 1;
            false
        });
        removed
    }

    // == Purge Expired ==
    /// Removes all expired entries and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let expired = entry.is_expired_at(now);
            if expired {
                removed += 1;
            }
            !expired
        });

        if removed > 0 {
            self.stats.record_expirations(removed as u64);
        }
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.peek(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn segment(capacity: usize) -> L1Segment {
        L1Segment::new(
            capacity,
            Duration::from_secs(300),
            None,
            Arc::new(StatsCounters::new()),
        )
    }

    fn val(v: i64) -> CachedValue {
        Arc::new(v)
    }

    fn get_i64(seg: &L1Segment, key: &str) -> Option<i64> {
        seg.get(key).and_then(|v| v.downcast_ref::<i64>().copied())
    }

    #[test]
    fn test_insert_and_get() {
        let seg = segment(10);
        seg.insert("dict:1".into(), val(1));
        assert_eq!(get_i64(&seg, "dict:1"), Some(1));
        assert_eq!(seg.len(), 1);
    }

    #[test]
    fn test_get_missing() {
        let seg = segment(10);
        assert!(seg.get("nope").is_none());
    }

    #[test]
    fn test_overwrite_keeps_single_entry() {
        let seg = segment(10);
        seg.insert("k".into(), val(1));
        seg.insert("k".into(), val(2));
        assert_eq!(get_i64(&seg, "k"), Some(2));
        assert_eq!(seg.len(), 1);
    }

    #[test]
    fn test_overwrite_at_capacity_evicts_nothing() {
        let seg = segment(2);
        seg.insert("a".into(), val(1));
        seg.insert("b".into(), val(2));
        seg.insert("a".into(), val(3));
        assert!(seg.contains("a"));
        assert!(seg.contains("b"));
    }

    #[test]
    fn test_remove() {
        let seg = segment(10);
        seg.insert("k".into(), val(1));
        assert!(seg.remove("k"));
        assert!(!seg.remove("k"));
        assert!(seg.is_empty());
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let stats = Arc::new(StatsCounters::new());
        let seg = L1Segment::new(3, Duration::from_secs(300), None, Arc::clone(&stats));
        seg.insert("k1".into(), val(1));
        seg.insert("k2".into(), val(2));
        seg.insert("k3".into(), val(3));

        // k1 becomes most recently used, k2 is now the oldest
        seg.get("k1");
        seg.insert("k4".into(), val(4));

        assert_eq!(seg.len(), 3);
        assert!(seg.get("k2").is_none());
        assert!(seg.get("k1").is_some());
        assert_eq!(stats.snapshot("t", 0).capacity_evictions, 1);
    }

    #[test]
    fn test_write_ttl_expiry() {
        let seg = L1Segment::new(
            10,
            Duration::from_millis(50),
            None,
            Arc::new(StatsCounters::new()),
        );
        seg.insert("k".into(), val(1));
        assert!(seg.get("k").is_some());
        sleep(Duration::from_millis(80));
        assert!(seg.get("k").is_none());
        assert!(seg.is_empty(), "expired entry should be dropped on read");
    }

    #[test]
    fn test_purge_expired() {
        let stats = Arc::new(StatsCounters::new());
        let seg = L1Segment::new(
            10,
            Duration::from_millis(50),
            None,
            Arc::clone(&stats),
        );
        seg.insert("a".into(), val(1));
        seg.insert("b".into(), val(2));
        sleep(Duration::from_millis(80));

        assert_eq!(seg.purge_expired(), 2);
        assert!(seg.is_empty());
        assert_eq!(stats.snapshot("t", 0).expirations, 2);
    }

    #[test]
    fn test_clear() {
        let seg = segment(10);
        seg.insert("a".into(), val(1));
        seg.insert("b".into(), val(2));
        assert_eq!(seg.clear(), 2);
        assert!(seg.get("a").is_none());
    }

    #[test]
    fn test_peek_does_not_refresh_lru() {
        let seg = segment(2);
        seg.insert("a".into(), val(1));
        seg.insert("b".into(), val(2));
        assert!(seg.peek("a").is_some());
        seg.insert("c".into(), val(3));
        assert!(!seg.contains("a"), "peek must not protect a from eviction");
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let seg = Arc::new(segment(1024));
        for i in 0..32 {
            seg.insert(format!("k{}", i), val(i));
        }

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let seg = Arc::clone(&seg);
                std::thread::spawn(move || {
                    for i in 0..32 {
                        assert_eq!(get_i64(&seg, &format!("k{}", i)), Some(i));
                        seg.insert(format!("t{}:{}", t, i), val(i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(seg.len(), 32 + 8 * 32);
    }
}
