//! Shared Tier (L2)
//!
//! Byte-oriented store visible to every instance. Writes are best-effort:
//! a lost write degrades to a later miss, never to a wrong read.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use deadpool_redis::{Config as RedisPoolConfig, Pool, PoolConfig, Runtime};
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{CacheError, Result};

/// Keys fetched per `SCAN` round trip during prefix deletion.
const SCAN_BATCH: usize = 100;

// == L2 Store Trait ==
#[async_trait]
pub trait L2Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Deletes every key starting with `prefix`; returns how many went.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64>;

    /// Short label used in logs.
    fn backend(&self) -> &'static str;
}

// == Redis ==
/// Redis-backed shared tier over a deadpool connection pool.
#[derive(Clone)]
pub struct RedisL2 {
    pool: Pool,
}

impl RedisL2 {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Builds a pool and checks that the server answers `PING`.
    pub async fn connect(url: &str, pool_size: usize, timeout: Duration) -> Result<Self> {
        let mut pool_cfg = PoolConfig::new(pool_size);
        pool_cfg.timeouts.wait = Some(timeout);
        pool_cfg.timeouts.create = Some(timeout);
        pool_cfg.timeouts.recycle = Some(timeout);

        let mut cfg = RedisPoolConfig::from_url(url);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::L2(format!("failed to create pool: {}", e)))?;

        let mut conn = pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(pool_size, "Connected to Redis shared tier");

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl L2Store for RedisL2 {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.pool.get().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        let mut conn = self.pool.get().await?;
        let pattern = format!("{}*", prefix);
        let mut cursor = 0u64;
        let mut deleted = 0u64;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !batch.is_empty() {
                let removed: u64 = conn.del(&batch).await?;
                deleted += removed;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        debug!(prefix = %prefix, deleted, "Redis prefix delete finished");
        Ok(deleted)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

// == In-Memory ==
/// Process-local shared tier. Stands in for Redis in tests and
/// single-instance deployments. Expired keys are dropped when read and
/// swept on every write.
#[derive(Debug, Default)]
pub struct MemoryL2 {
    entries: RwLock<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryL2 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, deadline)| *deadline > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, key: &str) -> bool {
        matches!(self.get(key).await, Ok(Some(_)))
    }
}

#[async_trait]
impl L2Store for MemoryL2 {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((bytes, deadline)) if *deadline > now => return Ok(Some(bytes.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|(_, deadline)| *deadline <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, deadline)| *deadline > now);
        entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_set_get_delete() {
        let l2 = MemoryL2::new();
        l2.set("dict:5", b"{}".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(l2.get("dict:5").await.unwrap(), Some(b"{}".to_vec()));

        l2.delete("dict:5").await.unwrap();
        assert_eq!(l2.get("dict:5").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_entries_expire() {
        let l2 = MemoryL2::new();
        l2.set("k", vec![1], Duration::from_millis(30)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(l2.get("k").await.unwrap().is_none());
        assert!(l2.is_empty().await);
        assert!(l2.entries.read().await.is_empty(), "expired key should be dropped on read");
    }

    #[tokio::test]
    async fn test_memory_write_sweeps_expired_keys() {
        let l2 = MemoryL2::new();
        for i in 0..10 {
            l2.set(&format!("role:{}", i), vec![1], Duration::from_millis(20))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(40)).await;

        l2.set("role:live", vec![2], Duration::from_secs(60)).await.unwrap();
        assert_eq!(l2.entries.read().await.len(), 1);
        assert!(l2.contains("role:live").await);
    }

    #[tokio::test]
    async fn test_memory_delete_by_prefix_spares_neighbours() {
        let l2 = MemoryL2::new();
        let ttl = Duration::from_secs(60);
        l2.set("dict:1", vec![1], ttl).await.unwrap();
        l2.set("dict:code:sex", vec![2], ttl).await.unwrap();
        l2.set("dictItems:1", vec![3], ttl).await.unwrap();

        assert_eq!(l2.delete_by_prefix("dict:").await.unwrap(), 2);
        assert!(l2.contains("dictItems:1").await);
        assert!(!l2.contains("dict:1").await);
    }
}
