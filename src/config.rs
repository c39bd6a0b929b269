//! Configuration Module
//!
//! Loads server and cache settings from environment variables. Values that
//! are present but unparsable stop the startup; absent values fall back to
//! defaults.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{CacheNamespaceConfig, EngineOptions, NamespaceRegistry};
use crate::domain::Domain;
use crate::error::{CacheError, Result};
use crate::tasks::WarmUpScheduler;

// == Domain Overrides ==
/// Per-domain settings applied to every namespace of the domain.
///
/// Read from `<D>_CACHE_*`, e.g. `DICT_CACHE_L1_CAPACITY`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomainOverrides {
    pub enabled: Option<bool>,
    pub l1_enabled: Option<bool>,
    pub l1_capacity: Option<usize>,
    pub l1_ttl_write: Option<i64>,
    pub l1_ttl_access: Option<i64>,
    pub l2_enabled: Option<bool>,
    pub l2_ttl: Option<i64>,
}

impl DomainOverrides {
    fn apply(&self, cfg: &mut CacheNamespaceConfig) {
        if let Some(v) = self.enabled {
            cfg.enabled = v;
        }
        if let Some(v) = self.l1_enabled {
            cfg.l1_enabled = v;
        }
        if let Some(v) = self.l1_capacity {
            cfg.l1_capacity = v;
        }
        if let Some(v) = self.l1_ttl_write {
            cfg.l1_ttl_write_secs = v;
        }
        if let Some(v) = self.l1_ttl_access {
            cfg.l1_ttl_access_secs = v;
        }
        if let Some(v) = self.l2_enabled {
            cfg.l2_enabled = v;
        }
        if let Some(v) = self.l2_ttl {
            cfg.l2_ttl_secs = v;
        }
    }
}

// == Config ==
/// Server configuration parameters.
#[derive(Debug, Clone)]
pub struct Config {
    /// Global cache switch; off means every read hits the backing store
    pub cache_enabled: bool,
    /// HTTP server port
    pub server_port: u16,
    /// Shared tier location; `None` runs L1-only
    pub redis_url: Option<String>,
    pub redis_pool_size: usize,
    pub redis_timeout_ms: u64,
    pub l2_write_workers: usize,
    pub l2_write_queue: usize,
    pub l2_write_timeout_ms: u64,
    /// L1 expiry sweep interval in seconds
    pub cleanup_interval: u64,
    pub warmup_on_start: bool,
    /// Seconds between scheduled warm-ups (0 = disabled)
    pub warmup_interval: u64,
    pub warmup_concurrency: usize,
    /// Overall warm-up deadline per domain, in seconds
    pub warmup_timeout: u64,
    pub warmup_entity_timeout: u64,
    /// Seconds between refresh sweeps (0 = disabled)
    pub refresh_interval: u64,
    /// How far back a refresh sweep looks for changes, in seconds
    pub refresh_window: u64,
    /// JSON snapshot for the in-memory backing store
    pub seed_file: Option<String>,
    pub domains: HashMap<Domain, DomainOverrides>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_ENABLED` (default: true)
    /// - `SERVER_PORT` (default: 3000)
    /// - `REDIS_URL`, `REDIS_POOL_SIZE` (16), `REDIS_TIMEOUT_MS` (500)
    /// - `L2_WRITE_WORKERS` (4), `L2_WRITE_QUEUE` (1024), `L2_WRITE_TIMEOUT_MS` (500)
    /// - `CLEANUP_INTERVAL` (30)
    /// - `WARMUP_ON_START` (true), `WARMUP_INTERVAL` (86400), `WARMUP_CONCURRENCY` (8),
    ///   `WARMUP_TIMEOUT` (120), `WARMUP_ENTITY_TIMEOUT` (10)
    /// - `REFRESH_INTERVAL` (600), `REFRESH_WINDOW` (600)
    /// - `SEED_FILE`
    /// - `<D>_CACHE_{ENABLED,L1_ENABLED,L1_CAPACITY,L1_TTL_WRITE,L1_TTL_ACCESS,L2_ENABLED,L2_TTL}`
    ///   for `D` in `DICT`, `ROLE`, `MENU`, `PERMISSION`, `CONFIG`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup: &lookup };
        let defaults = Self::default();

        let mut domains = HashMap::new();
        for domain in Domain::ALL {
            let key = |suffix: &str| format!("{}_CACHE_{}", domain.env_prefix(), suffix);
            let overrides = DomainOverrides {
                enabled: vars.bool_opt(&key("ENABLED"))?,
                l1_enabled: vars.bool_opt(&key("L1_ENABLED"))?,
                l1_capacity: vars.parse_opt(&key("L1_CAPACITY"))?,
                l1_ttl_write: vars.parse_opt(&key("L1_TTL_WRITE"))?,
                l1_ttl_access: vars.parse_opt(&key("L1_TTL_ACCESS"))?,
                l2_enabled: vars.bool_opt(&key("L2_ENABLED"))?,
                l2_ttl: vars.parse_opt(&key("L2_TTL"))?,
            };
            if overrides != DomainOverrides::default() {
                domains.insert(domain, overrides);
            }
        }

        let config = Self {
            cache_enabled: vars.bool_or("CACHE_ENABLED", defaults.cache_enabled)?,
            server_port: vars.parse_or("SERVER_PORT", defaults.server_port)?,
            redis_url: vars.string_opt("REDIS_URL"),
            redis_pool_size: vars.parse_or("REDIS_POOL_SIZE", defaults.redis_pool_size)?,
            redis_timeout_ms: vars.parse_or("REDIS_TIMEOUT_MS", defaults.redis_timeout_ms)?,
            l2_write_workers: vars.parse_or("L2_WRITE_WORKERS", defaults.l2_write_workers)?,
            l2_write_queue: vars.parse_or("L2_WRITE_QUEUE", defaults.l2_write_queue)?,
            l2_write_timeout_ms: vars
                .parse_or("L2_WRITE_TIMEOUT_MS", defaults.l2_write_timeout_ms)?,
            cleanup_interval: vars.parse_or("CLEANUP_INTERVAL", defaults.cleanup_interval)?,
            warmup_on_start: vars.bool_or("WARMUP_ON_START", defaults.warmup_on_start)?,
            warmup_interval: vars.parse_or("WARMUP_INTERVAL", defaults.warmup_interval)?,
            warmup_concurrency: vars.parse_or("WARMUP_CONCURRENCY", defaults.warmup_concurrency)?,
            warmup_timeout: vars.parse_or("WARMUP_TIMEOUT", defaults.warmup_timeout)?,
            warmup_entity_timeout: vars
                .parse_or("WARMUP_ENTITY_TIMEOUT", defaults.warmup_entity_timeout)?,
            refresh_interval: vars.parse_or("REFRESH_INTERVAL", defaults.refresh_interval)?,
            refresh_window: vars.parse_or("REFRESH_WINDOW", defaults.refresh_window)?,
            seed_file: vars.string_opt("SEED_FILE"),
            domains,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let positive = [
            ("REDIS_POOL_SIZE", self.redis_pool_size as u64),
            ("REDIS_TIMEOUT_MS", self.redis_timeout_ms),
            ("L2_WRITE_WORKERS", self.l2_write_workers as u64),
            ("L2_WRITE_TIMEOUT_MS", self.l2_write_timeout_ms),
            ("L2_WRITE_QUEUE", self.l2_write_queue as u64),
            ("CLEANUP_INTERVAL", self.cleanup_interval),
            ("WARMUP_CONCURRENCY", self.warmup_concurrency as u64),
            ("WARMUP_TIMEOUT", self.warmup_timeout),
            ("WARMUP_ENTITY_TIMEOUT", self.warmup_entity_timeout),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(CacheError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        // Catches bad per-domain overrides before anything is spawned.
        self.registry().map(|_| ())
    }

    // == Derived Settings ==
    /// Every namespace's settings with the domain overrides applied.
    pub fn namespace_configs(&self) -> Vec<CacheNamespaceConfig> {
        Domain::ALL
            .iter()
            .flat_map(|domain| {
                let overrides = self.domains.get(domain);
                domain.default_configs().into_iter().map(move |mut cfg| {
                    if let Some(o) = overrides {
                        o.apply(&mut cfg);
                    }
                    cfg
                })
            })
            .collect()
    }

    pub fn registry(&self) -> Result<NamespaceRegistry> {
        NamespaceRegistry::build(self.cache_enabled, self.namespace_configs())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            l2_timeout: Duration::from_millis(self.redis_timeout_ms),
            write_workers: self.l2_write_workers,
            write_queue: self.l2_write_queue,
            write_timeout: Duration::from_millis(self.l2_write_timeout_ms),
        }
    }

    pub fn warmup_scheduler(&self) -> WarmUpScheduler {
        WarmUpScheduler::new(
            self.warmup_concurrency,
            Duration::from_secs(self.warmup_entity_timeout),
            Duration::from_secs(self.warmup_timeout),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            server_port: 3000,
            redis_url: None,
            redis_pool_size: 16,
            redis_timeout_ms: 500,
            l2_write_workers: 4,
            l2_write_queue: 1024,
            l2_write_timeout_ms: 500,
            cleanup_interval: 30,
            warmup_on_start: true,
            warmup_interval: 24 * 60 * 60,
            warmup_concurrency: 8,
            warmup_timeout: 120,
            warmup_entity_timeout: 10,
            refresh_interval: 600,
            refresh_window: 600,
            seed_file: None,
            domains: HashMap::new(),
        }
    }
}

// == Variable Parsing ==
struct Vars<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    /// Present and non-blank values only.
    fn string_opt(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_opt<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        match self.string_opt(name) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                CacheError::InvalidConfig(format!("{}: cannot parse '{}'", name, raw))
            }),
        }
    }

    fn parse_or<T: FromStr>(&self, name: &str, default: T) -> Result<T> {
        Ok(self.parse_opt(name)?.unwrap_or(default))
    }

    fn bool_opt(&self, name: &str) -> Result<Option<bool>> {
        match self.string_opt(name) {
            None => Ok(None),
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(Some(true)),
                "false" | "0" | "no" | "off" => Ok(Some(false)),
                _ => Err(CacheError::InvalidConfig(format!(
                    "{}: expected a boolean, got '{}'",
                    name, raw
                ))),
            },
        }
    }

    fn bool_or(&self, name: &str, default: bool) -> Result<bool> {
        Ok(self.bool_opt(name)?.unwrap_or(default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ns;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.cache_enabled);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.cleanup_interval, 30);
        assert_eq!(config.warmup_interval, 86400);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_config_from_empty_env_matches_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.redis_pool_size, 16);
        assert_eq!(config.refresh_window, 600);
        assert!(config.domains.is_empty());
    }

    #[test]
    fn test_unparsable_value_fails_fast() {
        let err = load(&[("SERVER_PORT", "http")]).unwrap_err();
        assert!(matches!(err, CacheError::InvalidConfig(_)));

        let err = load(&[("WARMUP_ON_START", "maybe")]).unwrap_err();
        assert!(matches!(err, CacheError::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_cleanup_interval_rejected() {
        assert!(load(&[("CLEANUP_INTERVAL", "0")]).is_err());
    }

    #[test]
    fn test_zero_l2_timeouts_rejected() {
        for name in ["REDIS_TIMEOUT_MS", "L2_WRITE_TIMEOUT_MS"] {
            let err = load(&[(name, "0")]).unwrap_err();
            assert!(err.to_string().contains(name), "{}", err);
        }
    }

    #[test]
    fn test_domain_overrides_apply_to_every_namespace() {
        let config = load(&[
            ("DICT_CACHE_L1_CAPACITY", "50"),
            ("DICT_CACHE_L2_ENABLED", "false"),
            ("REDIS_URL", "redis://127.0.0.1:6379"),
        ])
        .unwrap();

        let registry = config.registry().unwrap();
        for name in Domain::Dict.namespaces() {
            let ns = registry.get(name).unwrap();
            assert_eq!(ns.l1_capacity, 50);
            assert!(!ns.l2_enabled);
        }
        assert_eq!(registry.get(ns::ROLE).unwrap().l1_capacity, 500);
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
    }

    #[test]
    fn test_negative_ttl_override_rejected() {
        let err = load(&[("MENU_CACHE_L2_TTL", "-5")]).unwrap_err();
        assert!(matches!(err, CacheError::InvalidConfig(_)));
    }

    #[test]
    fn test_disabled_domain() {
        let config = load(&[("CONFIG_CACHE_ENABLED", "off")]).unwrap();
        let registry = config.registry().unwrap();
        assert!(!registry.is_enabled(ns::CONFIG));
        assert!(registry.is_enabled(ns::DICT));
    }

    #[test]
    fn test_derived_settings() {
        let config = Config::default();
        let options = config.engine_options();
        assert_eq!(options.l2_timeout, Duration::from_millis(500));
        assert_eq!(options.write_workers, 4);
    }
}
