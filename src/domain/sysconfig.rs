//! System Config Cache
//!
//! Settings are cached twice per key: the whole entity (`config`) and the
//! raw value string (`configValue`), so value-only readers skip entity
//! decoding.

use std::sync::Arc;

use super::{ns, Domain};
use crate::cache::{CacheKey, CascadeRules, TwoTierCache};
use crate::error::Result;
use crate::models::SysConfig;
use crate::source::ConfigSource;
use crate::tasks::{WarmUpReport, WarmUpScheduler};

// == Cascade ==
/// `config:code:<key>` takes `configValue:code:<key>` with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigCascade;

impl CascadeRules for ConfigCascade {
    fn dependents(&self, key: &CacheKey) -> Vec<CacheKey> {
        if key.namespace() == ns::CONFIG {
            vec![CacheKey::new(ns::CONFIG_VALUE, key.qualifier().clone())]
        } else {
            Vec::new()
        }
    }
}

// == Config Cache ==
#[derive(Clone)]
pub struct ConfigCache {
    engine: Arc<TwoTierCache>,
    source: Arc<dyn ConfigSource>,
}

impl ConfigCache {
    pub fn new(engine: Arc<TwoTierCache>, source: Arc<dyn ConfigSource>) -> Self {
        Self { engine, source }
    }

    // == Reads ==
    pub async fn get(&self, config_key: &str) -> Result<Option<SysConfig>> {
        self.engine
            .get(&CacheKey::code(ns::CONFIG, config_key), || {
                self.source.config_by_key(config_key)
            })
            .await
    }

    /// The raw value of a setting.
    pub async fn get_value(&self, config_key: &str) -> Result<Option<String>> {
        self.engine
            .get(&CacheKey::code(ns::CONFIG_VALUE, config_key), || async move {
                let config = self.source.config_by_key(config_key).await?;
                anyhow::Ok(config.map(|c| c.config_value))
            })
            .await
    }

    /// The value parsed as `T`, or `default` when unset or unparsable.
    pub async fn get_value_or<T: std::str::FromStr>(&self, config_key: &str, default: T) -> Result<T> {
        Ok(self
            .get_value(config_key)
            .await?
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(default))
    }

    // == Explicit Population ==
    /// Caches the entity and its raw value.
    pub async fn cache_config(&self, config: &SysConfig) -> Result<()> {
        self.engine
            .put(&CacheKey::code(ns::CONFIG, &config.config_key), config)
            .await?;
        self.cache_value(&config.config_key, &config.config_value)
            .await
    }

    pub async fn cache_value(&self, config_key: &str, value: &str) -> Result<()> {
        self.engine
            .put(&CacheKey::code(ns::CONFIG_VALUE, config_key), &value.to_string())
            .await
    }

    // == Eviction ==
    /// Evicts the entity and its raw value.
    pub async fn evict(&self, config_key: &str) -> Result<()> {
        self.engine
            .evict_cascade(&ConfigCascade, &CacheKey::code(ns::CONFIG, config_key))
            .await
    }

    pub async fn evict_value(&self, config_key: &str) -> Result<()> {
        self.engine
            .evict(&CacheKey::code(ns::CONFIG_VALUE, config_key))
            .await
    }

    pub async fn evict_all(&self) -> Result<()> {
        self.engine.evict_all(Domain::Config.namespaces()).await
    }

    // == Warm-Up ==
    pub async fn warm_up(&self, scheduler: &WarmUpScheduler) -> Result<WarmUpReport> {
        if !Domain::Config.is_enabled(&self.engine) {
            return Ok(WarmUpReport::skipped(Domain::Config.as_str()));
        }
        let configs = self.source.list_configs().await?;
        let this = self.clone();
        let report = scheduler
            .run(Domain::Config.as_str(), configs, move |config: SysConfig| {
                let this = this.clone();
                async move { this.cache_config(&config).await }
            })
            .await;
        Ok(report)
    }
}
