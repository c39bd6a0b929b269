//! Scheduled Warm-Up and Refresh
//!
//! Periodic jobs over the domain managers. An interval of `0` disables
//! the job and no task is spawned.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::WarmUpScheduler;
use crate::domain::DomainCaches;

/// Warms every domain every `interval_secs` seconds.
pub fn spawn_warmup_task(
    caches: DomainCaches,
    scheduler: WarmUpScheduler,
    interval_secs: u64,
) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        info!("Scheduled warm-up disabled");
        return None;
    }
    let interval = Duration::from_secs(interval_secs);

    Some(tokio::spawn(async move {
        info!("Starting scheduled warm-up every {} seconds", interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            if caches.engine().is_shutting_down() {
                break;
            }

            match caches.warm_up_all(&scheduler).await {
                Ok(reports) => {
                    let incomplete = reports.iter().filter(|r| !r.is_complete()).count();
                    info!(domains = reports.len(), incomplete, "scheduled warm-up finished");
                }
                Err(e) => warn!(error = %e, "scheduled warm-up stopped"),
            }
        }
    }))
}

/// Evicts entities changed within `window` every `interval_secs` seconds.
pub fn spawn_refresh_task(
    caches: DomainCaches,
    interval_secs: u64,
    window: Duration,
) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        info!("Scheduled refresh disabled");
        return None;
    }
    let interval = Duration::from_secs(interval_secs);

    Some(tokio::spawn(async move {
        info!(
            "Starting refresh sweep every {} seconds over a {}s window",
            interval_secs,
            window.as_secs()
        );
        loop {
            tokio::time::sleep(interval).await;
            if caches.engine().is_shutting_down() {
                break;
            }

            if let Err(e) = caches.refresh_recent(window).await {
                warn!(error = %e, "refresh sweep failed");
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;

    use crate::cache::{CacheKey, NamespaceRegistry, TwoTierCache};
    use crate::domain::{default_namespace_configs, ns};
    use crate::models::Dict;
    use crate::source::{InMemorySource, SeedData};

    fn dict(id: i64, code: &str, changed: bool) -> Dict {
        Dict {
            id,
            dict_name: code.to_uppercase(),
            dict_code: code.to_string(),
            sort: None,
            remark: None,
            status: 1,
            updated_at: changed.then(Utc::now),
        }
    }

    fn caches() -> DomainCaches {
        let registry = NamespaceRegistry::build(true, default_namespace_configs()).unwrap();
        let engine = Arc::new(TwoTierCache::local(registry));
        let source = Arc::new(InMemorySource::new(SeedData {
            dicts: vec![dict(1, "sex", true), dict(2, "status", false)],
            ..Default::default()
        }));
        DomainCaches::new(engine, source)
    }

    #[tokio::test]
    async fn test_zero_interval_spawns_nothing() {
        let caches = caches();
        assert!(spawn_warmup_task(caches.clone(), WarmUpScheduler::default(), 0).is_none());
        assert!(spawn_refresh_task(caches, 0, Duration::from_secs(60)).is_none());
    }

    #[tokio::test]
    async fn test_refresh_task_evicts_recent_changes() {
        let caches = caches();
        caches.dict.get_by_id(1).await.unwrap();
        caches.dict.get_by_id(2).await.unwrap();

        let handle = spawn_refresh_task(caches.clone(), 1, Duration::from_secs(600)).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.abort();

        let engine = caches.engine();
        assert!(engine.peek::<Dict>(&CacheKey::id(ns::DICT, 1)).await.is_none());
        assert!(engine.peek::<Dict>(&CacheKey::code(ns::DICT, "sex")).await.is_none());
        assert!(engine.peek::<Dict>(&CacheKey::id(ns::DICT, 2)).await.is_some());
    }

    #[tokio::test]
    async fn test_warmup_task_populates_on_tick() {
        let caches = caches();
        let handle = spawn_warmup_task(caches.clone(), WarmUpScheduler::default(), 1).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.abort();

        let cached = caches
            .engine()
            .peek::<Dict>(&CacheKey::code(ns::DICT, "status"))
            .await;
        assert_eq!(cached.map(|d| d.id), Some(2));
    }
}
