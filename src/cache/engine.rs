//! Two-Tier Cache Engine
//!
//! Read-through cache over an in-process L1 and an optional shared L2.
//! One engine instance is created at startup and shared by every domain
//! manager.
//!
//! # Read path
//! 1. Namespace disabled: call the loader and return, nothing is stored.
//! 2. L1 hit: return.
//! 3. L2 hit: populate L1, return.
//! 4. Full miss: run the loader. A present value is written to L1 before
//!    returning and handed to the L2 writer pool in the background.
//!    Absent values are not cached.
//!
//! Loader errors reach the caller unchanged. L2 errors never do; they are
//! logged, counted and treated as a miss.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::key::CacheKey;
use crate::cache::l1::L1Cache;
use crate::cache::l2::L2Store;
use crate::cache::namespace::NamespaceRegistry;
use crate::cache::writer::{L2WriteJob, L2WritePool, WriteFence};
use crate::cache::{CacheStats, StatsCounters};
use crate::error::{CacheError, Result};

// == Cache Value ==
/// Anything that can live in both tiers: cloned out of L1, JSON in L2.
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

// == Cascade Rules ==
/// Domain strategy naming the keys that must go whenever `key` goes.
///
/// Only keys derivable from `key` alone belong here; fan-out that needs a
/// lookup (dict id to dict code) stays in the domain manager.
pub trait CascadeRules: Send + Sync {
    fn dependents(&self, key: &CacheKey) -> Vec<CacheKey>;
}

// == Engine Options ==
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Bound on every foreground L2 call (get, delete, prefix delete)
    pub l2_timeout: Duration,
    /// Background L2 writer tasks
    pub write_workers: usize,
    /// Pending L2 writes before new ones are dropped
    pub write_queue: usize,
    /// Bound on each background L2 write
    pub write_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            l2_timeout: Duration::from_millis(500),
            write_workers: 4,
            write_queue: 1024,
            write_timeout: Duration::from_millis(500),
        }
    }
}

// == Two-Tier Cache ==
pub struct TwoTierCache {
    registry: Arc<NamespaceRegistry>,
    l1: L1Cache,
    l2: Option<Arc<dyn L2Store>>,
    writer: Option<L2WritePool>,
    fence: Arc<WriteFence>,
    stats: HashMap<&'static str, Arc<StatsCounters>>,
    options: EngineOptions,
    shutting_down: AtomicBool,
}

impl std::fmt::Debug for TwoTierCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoTierCache")
            .field("registry", &self.registry)
            .field("l2", &self.l2.as_ref().map(|l2| l2.backend()))
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl TwoTierCache {
    // == Constructor ==
    /// Builds the engine. With an L2 store, the background writer pool is
    /// started, so this must run inside a tokio runtime.
    pub fn new(
        registry: NamespaceRegistry,
        l2: Option<Arc<dyn L2Store>>,
        options: EngineOptions,
    ) -> Self {
        let stats: HashMap<&'static str, Arc<StatsCounters>> = registry
            .names()
            .map(|name| (name, Arc::new(StatsCounters::new())))
            .collect();
        let l1 = L1Cache::new(&registry, &stats);
        let fence = Arc::new(WriteFence::new());
        let writer = l2.as_ref().map(|store| {
            L2WritePool::spawn(
                Arc::clone(store),
                Arc::clone(&fence),
                options.write_workers,
                options.write_queue,
                options.write_timeout,
            )
        });

        Self {
            registry: Arc::new(registry),
            l1,
            l2,
            writer,
            fence,
            stats,
            options,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// L1-only engine with default options.
    pub fn local(registry: NamespaceRegistry) -> Self {
        Self::new(registry, None, EngineOptions::default())
    }

    pub fn registry(&self) -> &NamespaceRegistry {
        &self.registry
    }

    /// Label of the attached shared tier, if any.
    pub fn l2_backend(&self) -> Option<&'static str> {
        self.l2.as_ref().map(|l2| l2.backend())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    fn has_l2(&self) -> bool {
        self.l2.is_some()
    }

    fn l2_for(&self, namespace: &str) -> Option<&Arc<dyn L2Store>> {
        self.l2
            .as_ref()
            .filter(|_| self.registry.is_l2_enabled(namespace))
    }

    fn counters(&self, namespace: &str) -> Arc<StatsCounters> {
        self.stats.get(namespace).cloned().unwrap_or_default()
    }

    fn storage_key(&self, key: &CacheKey) -> Result<String> {
        let ns = self.registry.require(key.namespace())?;
        Ok(key.render(&ns.key_prefix))
    }

    async fn l2_call<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.options.l2_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::L2(format!(
                "timed out after {}ms",
                self.options.l2_timeout.as_millis()
            ))),
        }
    }

    // == Get ==
    /// Read-through lookup of `key`, falling back to `loader` on a full miss.
    pub async fn get<V, F, Fut>(&self, key: &CacheKey, loader: F) -> Result<Option<V>>
    where
        V: CacheValue,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = anyhow::Result<Option<V>>> + Send,
    {
        let namespace = key.namespace();
        let storage_key = self.storage_key(key)?;

        if !self.registry.is_enabled(namespace) {
            debug!(namespace, key = %storage_key, "cache bypassed");
            return loader().await.map_err(CacheError::Source);
        }

        let stats = self.counters(namespace);

        if let Some(value) = self.l1_lookup::<V>(namespace, &storage_key) {
            stats.record_l1_hit();
            debug!(namespace, key = %storage_key, "L1 hit");
            return Ok(Some(value));
        }

        if let Some(value) = self.l2_lookup::<V>(namespace, &storage_key, &stats).await {
            stats.record_l2_hit();
            debug!(namespace, key = %storage_key, "L2 hit");
            if self.registry.is_l1_enabled(namespace) {
                self.l1.insert(namespace, storage_key, Arc::new(value.clone()));
            }
            return Ok(Some(value));
        }

        stats.record_miss();
        debug!(namespace, key = %storage_key, "cache miss, loading");

        match loader().await {
            Ok(Some(value)) => {
                self.store(namespace, storage_key, &value, &stats);
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                stats.record_load_error();
                Err(CacheError::Source(e))
            }
        }
    }

    fn l1_lookup<V: CacheValue>(&self, namespace: &str, storage_key: &str) -> Option<V> {
        if !self.registry.is_l1_enabled(namespace) {
            return None;
        }
        let cached = self.l1.get(namespace, storage_key)?;
        match cached.downcast_ref::<V>() {
            Some(value) => Some(value.clone()),
            None => {
                warn!(
                    namespace,
                    key = %storage_key,
                    expected = std::any::type_name::<V>(),
                    "L1 value has unexpected type, dropping"
                );
                self.l1.remove(namespace, storage_key);
                None
            }
        }
    }

    async fn l2_lookup<V: CacheValue>(
        &self,
        namespace: &str,
        storage_key: &str,
        stats: &StatsCounters,
    ) -> Option<V> {
        let l2 = self.l2_for(namespace)?;
        let bytes = match self.l2_call(l2.get(storage_key)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                stats.record_l2_error();
                warn!(namespace, key = %storage_key, error = %e, "L2 read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice::<V>(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                stats.record_l2_error();
                warn!(namespace, key = %storage_key, error = %e, "L2 value unreadable, treating as miss");
                None
            }
        }
    }

    /// Synchronous L1 write plus queued L2 write.
    fn store<V: CacheValue>(
        &self,
        namespace: &'static str,
        storage_key: String,
        value: &V,
        stats: &Arc<StatsCounters>,
    ) {
        if self.l2_for(namespace).is_some() {
            self.submit_l2(namespace, &storage_key, value, stats);
        }
        if self.registry.is_l1_enabled(namespace) {
            self.l1.insert(namespace, storage_key, Arc::new(value.clone()));
        }
    }

    fn submit_l2<V: CacheValue>(
        &self,
        namespace: &'static str,
        storage_key: &str,
        value: &V,
        stats: &Arc<StatsCounters>,
    ) {
        let Some(writer) = self.writer.as_ref() else {
            return;
        };
        let Some(ttl) = self.registry.l2_ttl(namespace) else {
            return;
        };

        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                stats.record_l2_error();
                warn!(namespace, key = %storage_key, error = %e, "serialization failed, skipping L2 write");
                return;
            }
        };

        writer.submit(L2WriteJob {
            key: storage_key.to_string(),
            bytes,
            ttl,
            epoch: self.fence.epoch(storage_key),
            stats: Arc::clone(stats),
        });
    }

    // == Put ==
    /// Explicit write-through population, used right after a fresh load
    /// from the backing store. No-op when the namespace is disabled.
    pub async fn put<V: CacheValue>(&self, key: &CacheKey, value: &V) -> Result<()> {
        let namespace = key.namespace();
        let storage_key = self.storage_key(key)?;
        if !self.registry.is_enabled(namespace) {
            return Ok(());
        }
        let stats = self.counters(namespace);
        self.store(namespace, storage_key, value, &stats);
        debug!(namespace, key = %key, "cache put");
        Ok(())
    }

    // == Peek ==
    /// L1-only read that leaves counters and eviction order untouched.
    pub async fn peek<V: CacheValue>(&self, key: &CacheKey) -> Option<V> {
        let namespace = key.namespace();
        if !self.registry.is_l1_enabled(namespace) {
            return None;
        }
        let storage_key = self.storage_key(key).ok()?;
        let cached = self.l1.peek(namespace, &storage_key)?;
        cached.downcast_ref::<V>().cloned()
    }

    // == Evict ==
    /// Removes `key` from L1, then awaits the L2 delete.
    ///
    /// Background writes for the key queued before this call are fenced
    /// off and never land. An L2 failure is logged only; the entry then
    /// lives until its L2 TTL.
    pub async fn evict(&self, key: &CacheKey) -> Result<()> {
        let namespace = key.namespace();
        let storage_key = self.storage_key(key)?;
        let stats = self.counters(namespace);

        if self.l1.remove(namespace, &storage_key) {
            stats.record_explicit_eviction();
        }

        if let Some(l2) = self.l2_for(namespace) {
            let _fence = self.fence.close(&storage_key).await;
            if let Err(e) = self.l2_call(l2.delete(&storage_key)).await {
                stats.record_l2_error();
                warn!(namespace, key = %storage_key, error = %e, "L2 delete failed");
            }
        }

        debug!(namespace, key = %storage_key, "cache evicted");
        Ok(())
    }

    /// Evicts `key` and every key the rules derive from it.
    pub async fn evict_cascade<R>(&self, rules: &R, key: &CacheKey) -> Result<()>
    where
        R: CascadeRules + ?Sized,
    {
        self.evict(key).await?;
        for dependent in rules.dependents(key) {
            self.evict(&dependent).await?;
        }
        Ok(())
    }

    // == Evict All ==
    /// Clears whole namespaces: every L1 entry and every L2 key under the
    /// namespace prefix.
    pub async fn evict_all(&self, namespaces: &[&str]) -> Result<()> {
        // Validate up front so a typo clears nothing.
        let targets = namespaces
            .iter()
            .map(|name| self.registry.require(name))
            .collect::<Result<Vec<_>>>()?;

        let _fences = if self.has_l2() {
            self.fence.close_all().await
        } else {
            Vec::new()
        };

        for ns in targets {
            let stats = self.counters(ns.name);
            let cleared = self.l1.clear(ns.name);

            let mut l2_cleared = 0;
            if let Some(l2) = self.l2_for(ns.name) {
                match self.l2_call(l2.delete_by_prefix(&ns.key_prefix)).await {
                    Ok(count) => l2_cleared = count,
                    Err(e) => {
                        stats.record_l2_error();
                        warn!(namespace = ns.name, error = %e, "L2 prefix delete failed");
                    }
                }
            }

            info!(namespace = ns.name, l1_cleared = cleared, l2_cleared, "namespace cleared");
        }
        Ok(())
    }

    /// Clears `namespace` and, transitively, its related namespaces.
    pub async fn evict_all_related(&self, namespace: &str) -> Result<()> {
        let name = self
            .registry
            .resolve(namespace)
            .ok_or_else(|| CacheError::UnknownNamespace(namespace.to_string()))?;
        let targets = self.registry.with_related(name);
        self.evict_all(&targets).await
    }

    // == Maintenance ==
    /// Drops expired L1 entries across all namespaces.
    pub async fn purge_expired(&self) -> usize {
        self.l1.purge_expired()
    }

    /// Counter snapshot for every namespace, ordered by name.
    pub async fn stats(&self) -> Vec<CacheStats> {
        let mut names: Vec<&'static str> = self.registry.names().collect();
        names.sort_unstable();

        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let entries = self.l1.len(name);
            out.push(self.counters(name).snapshot(name, entries));
        }
        out
    }

    /// Number of live L1 entries in `namespace`.
    pub async fn l1_len(&self, namespace: &str) -> usize {
        self.l1.len(namespace)
    }

    // == Shutdown ==
    /// Stops background L2 writes, waiting up to `grace` for the queue to
    /// drain. Reads keep working afterwards; new L2 writes are dropped.
    pub async fn shutdown(&self, grace: Duration) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(writer) = self.writer.as_ref() {
            writer.shutdown(grace).await;
        }
        info!("cache engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::l2::MemoryL2;
    use crate::cache::namespace::CacheNamespaceConfig;
    use std::sync::atomic::AtomicUsize;

    fn registry() -> NamespaceRegistry {
        NamespaceRegistry::build(
            true,
            vec![
                CacheNamespaceConfig::new("dict").related(&["dictItems"]),
                CacheNamespaceConfig::new("dictItems"),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = TwoTierCache::local(registry());
        let calls = AtomicUsize::new(0);
        let key = CacheKey::id("dict", 1);

        for _ in 0..3 {
            let value = cache
                .get(&key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Some("sex".to_string()))
                })
                .await
                .unwrap();
            assert_eq!(value.as_deref(), Some("sex"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats().await;
        let dict = stats.iter().find(|s| s.namespace == "dict").unwrap();
        assert_eq!(dict.misses, 1);
        assert_eq!(dict.l1_hits, 2);
        assert_eq!(dict.l1_entries, 1);
    }

    #[tokio::test]
    async fn test_absent_values_are_not_cached() {
        let cache = TwoTierCache::local(registry());
        let calls = AtomicUsize::new(0);
        let key = CacheKey::code("dict", "missing");

        for _ in 0..2 {
            let value: Option<String> = cache
                .get(&key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                })
                .await
                .unwrap();
            assert!(value.is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_loader_error_passes_through() {
        let cache = TwoTierCache::local(registry());
        let err = cache
            .get::<String, _, _>(&CacheKey::id("dict", 1), || async {
                Err(anyhow::anyhow!("connection refused"))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Source(_)));
        assert_eq!(err.to_string(), "connection refused");
    }

    #[tokio::test]
    async fn test_unknown_namespace_is_rejected() {
        let cache = TwoTierCache::local(registry());
        let result = cache
            .get(&CacheKey::id("nope", 1), || async { Ok(Some(1i64)) })
            .await;
        assert!(matches!(result, Err(CacheError::UnknownNamespace(_))));
    }

    #[tokio::test]
    async fn test_type_mismatch_falls_through_to_loader() {
        let cache = TwoTierCache::local(registry());
        let key = CacheKey::id("dict", 1);
        cache.put(&key, &"text".to_string()).await.unwrap();

        let value = cache.get(&key, || async { Ok(Some(7i64)) }).await.unwrap();
        assert_eq!(value, Some(7));
    }

    #[tokio::test]
    async fn test_evict_all_related_clears_both_tiers() {
        let l2 = Arc::new(MemoryL2::new());
        let shared: Arc<dyn L2Store> = l2.clone();
        let cache = TwoTierCache::new(registry(), Some(shared), EngineOptions::default());

        cache.put(&CacheKey::id("dict", 1), &1i64).await.unwrap();
        cache.put(&CacheKey::id("dictItems", 1), &vec![1i64]).await.unwrap();
        cache.shutdown(Duration::from_secs(1)).await;
        assert_eq!(l2.len().await, 2);

        cache.evict_all_related("dict").await.unwrap();
        assert_eq!(cache.l1_len("dict").await, 0);
        assert_eq!(cache.l1_len("dictItems").await, 0);
        assert!(l2.is_empty().await);
    }

    #[tokio::test]
    async fn test_evict_all_fences_queued_writes() {
        let l2 = Arc::new(MemoryL2::new());
        let shared: Arc<dyn L2Store> = l2.clone();
        let cache = TwoTierCache::new(registry(), Some(shared), EngineOptions::default());

        for id in 0..20 {
            cache.put(&CacheKey::id("dict", id), &id).await.unwrap();
        }
        cache.evict_all(&["dict"]).await.unwrap();
        cache.shutdown(Duration::from_secs(1)).await;

        assert!(l2.is_empty().await);
        assert_eq!(cache.l1_len("dict").await, 0);
    }

    struct ItemsFollowDict;

    impl CascadeRules for ItemsFollowDict {
        fn dependents(&self, key: &CacheKey) -> Vec<CacheKey> {
            vec![CacheKey::new("dictItems", key.qualifier().clone())]
        }
    }

    #[tokio::test]
    async fn test_evict_cascade_follows_rules() {
        let cache = TwoTierCache::local(registry());
        cache.put(&CacheKey::id("dict", 3), &3i64).await.unwrap();
        cache.put(&CacheKey::id("dictItems", 3), &vec![3i64]).await.unwrap();

        cache
            .evict_cascade(&ItemsFollowDict, &CacheKey::id("dict", 3))
            .await
            .unwrap();

        assert!(cache.peek::<i64>(&CacheKey::id("dict", 3)).await.is_none());
        assert!(cache
            .peek::<Vec<i64>>(&CacheKey::id("dictItems", 3))
            .await
            .is_none());
    }
}
