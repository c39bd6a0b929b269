//! L1 Cache Module
//!
//! The in-process tier: one [`L1Segment`] per L1-enabled namespace, so
//! traffic on one namespace never contends with another. The segment map
//! is fixed at startup and read without locking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::entry::CachedValue;
use crate::cache::namespace::NamespaceRegistry;
use crate::cache::store::L1Segment;
use crate::cache::StatsCounters;

// == L1 Cache ==
#[derive(Debug)]
pub struct L1Cache {
    segments: HashMap<&'static str, L1Segment>,
}

impl L1Cache {
    /// Creates a segment for every namespace with the L1 tier switched on.
    pub fn new(
        registry: &NamespaceRegistry,
        stats: &HashMap<&'static str, Arc<StatsCounters>>,
    ) -> Self {
        let segments = registry
            .names()
            .filter_map(|name| {
                let ns = registry.get(name)?;
                if !ns.l1_enabled {
                    return None;
                }
                let counters = stats.get(name).cloned().unwrap_or_default();
                let segment =
                    L1Segment::new(ns.l1_capacity, ns.l1_ttl_write, ns.l1_ttl_access, counters);
                Some((name, segment))
            })
            .collect();

        Self { segments }
    }

    /// Reads a value, refreshing its LRU position and idle deadline.
    pub fn get(&self, namespace: &str, key: &str) -> Option<CachedValue> {
        let segment = self.segments.get(namespace)?;
        segment.get(key)
    }

    /// Reads a value without affecting eviction order.
    pub fn peek(&self, namespace: &str, key: &str) -> Option<CachedValue> {
        let segment = self.segments.get(namespace)?;
        segment.peek(key)
    }

    pub fn insert(&self, namespace: &str, key: String, value: CachedValue) {
        if let Some(segment) = self.segments.get(namespace) {
            segment.insert(key, value);
        }
    }

    pub fn remove(&self, namespace: &str, key: &str) -> bool {
        match self.segments.get(namespace) {
            Some(segment) => segment.remove(key),
            None => false,
        }
    }

    /// Empties one namespace's segment.
    pub fn clear(&self, namespace: &str) -> usize {
        match self.segments.get(namespace) {
            Some(segment) => segment.clear(),
            None => 0,
        }
    }

    /// Sweeps expired entries from every segment.
    pub fn purge_expired(&self) -> usize {
        let mut removed = 0;
        for segment in self.segments.values() {
            removed += segment.purge_expired();
        }
        removed
    }

    pub fn len(&self, namespace: &str) -> usize {
        match self.segments.get(namespace) {
            Some(segment) => segment.len(),
            None => 0,
        }
    }

    pub fn has_segment(&self, namespace: &str) -> bool {
        self.segments.contains_key(namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::namespace::CacheNamespaceConfig;

    fn l1() -> L1Cache {
        let mut off = CacheNamespaceConfig::new("remote");
        off.l1_enabled = false;
        let registry =
            NamespaceRegistry::build(true, vec![CacheNamespaceConfig::new("local"), off]).unwrap();
        L1Cache::new(&registry, &HashMap::new())
    }

    #[test]
    fn test_only_l1_enabled_namespaces_get_segments() {
        let cache = l1();
        assert!(cache.has_segment("local"));
        assert!(!cache.has_segment("remote"));

        cache.insert("remote", "remote:1".into(), Arc::new(1i64));
        assert!(cache.get("remote", "remote:1").is_none());
        assert_eq!(cache.len("remote"), 0);
    }

    #[test]
    fn test_segments_are_isolated() {
        let cache = l1();
        cache.insert("local", "local:1".into(), Arc::new(1i64));
        assert!(cache.get("local", "local:1").is_some());
        assert_eq!(cache.clear("remote"), 0);
        assert_eq!(cache.clear("local"), 1);
        assert!(cache.peek("local", "local:1").is_none());
    }
}
