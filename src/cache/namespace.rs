//! Cache Namespace Registry
//!
//! Static, process-wide description of every logical cache domain. Built
//! once at startup and validated eagerly; lookups afterwards are plain
//! reads over an immutable map.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{CacheError, Result};

// == Namespace Config ==
/// Typed configuration for one namespace, shared by every domain.
///
/// Durations are signed seconds so that a negative value coming from the
/// environment is caught by validation instead of wrapping around.
#[derive(Debug, Clone)]
pub struct CacheNamespaceConfig {
    /// Unique namespace name
    pub name: &'static str,
    /// Master switch for this namespace
    pub enabled: bool,
    /// Enable the in-process tier
    pub l1_enabled: bool,
    /// Maximum number of L1 entries
    pub l1_capacity: usize,
    /// Expire L1 entries this many seconds after write
    pub l1_ttl_write_secs: i64,
    /// Expire L1 entries this many seconds after last access (0 = off)
    pub l1_ttl_access_secs: i64,
    /// Enable the shared tier
    pub l2_enabled: bool,
    /// Shared tier TTL in seconds
    pub l2_ttl_secs: i64,
    /// Storage key prefix, shared by both tiers
    pub key_prefix: String,
    /// Namespaces cleared together with this one by a cascading clear
    pub related_namespaces: Vec<&'static str>,
}

impl CacheNamespaceConfig {
    /// Creates a config with the default tier settings and `<name>:` prefix.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            enabled: true,
            l1_enabled: true,
            l1_capacity: 500,
            l1_ttl_write_secs: 30 * 60,
            l1_ttl_access_secs: 15 * 60,
            l2_enabled: true,
            l2_ttl_secs: 60 * 60,
            key_prefix: format!("{}:", name),
            related_namespaces: Vec::new(),
        }
    }

    pub fn related(mut self, namespaces: &[&'static str]) -> Self {
        self.related_namespaces = namespaces.to_vec();
        self
    }
}

// == Cache Namespace ==
/// Validated, immutable namespace settings.
#[derive(Debug, Clone)]
pub struct CacheNamespace {
    pub name: &'static str,
    pub enabled: bool,
    pub l1_enabled: bool,
    pub l1_capacity: usize,
    pub l1_ttl_write: Duration,
    pub l1_ttl_access: Option<Duration>,
    pub l2_enabled: bool,
    pub l2_ttl: Duration,
    pub key_prefix: String,
    pub related_namespaces: Vec<&'static str>,
}

impl TryFrom<CacheNamespaceConfig> for CacheNamespace {
    type Error = CacheError;

    fn try_from(cfg: CacheNamespaceConfig) -> Result<Self> {
        let invalid = |msg: String| CacheError::InvalidConfig(format!("{}: {}", cfg.name, msg));

        if cfg.name.is_empty() {
            return Err(CacheError::InvalidConfig("namespace name is empty".into()));
        }
        if cfg.key_prefix.is_empty() {
            return Err(invalid("key prefix is empty".into()));
        }
        if cfg.l1_ttl_write_secs < 0 || cfg.l1_ttl_access_secs < 0 || cfg.l2_ttl_secs < 0 {
            return Err(invalid("TTL values must not be negative".into()));
        }
        if cfg.l1_enabled && cfg.l1_capacity == 0 {
            return Err(invalid("L1 capacity must be greater than zero".into()));
        }
        if cfg.l1_enabled && cfg.l1_ttl_write_secs == 0 {
            return Err(invalid("L1 write TTL must be greater than zero".into()));
        }
        if cfg.l2_enabled && cfg.l2_ttl_secs == 0 {
            return Err(invalid("L2 TTL must be greater than zero".into()));
        }

        Ok(Self {
            name: cfg.name,
            enabled: cfg.enabled,
            l1_enabled: cfg.l1_enabled,
            l1_capacity: cfg.l1_capacity,
            l1_ttl_write: Duration::from_secs(cfg.l1_ttl_write_secs as u64),
            l1_ttl_access: (cfg.l1_ttl_access_secs > 0)
                .then(|| Duration::from_secs(cfg.l1_ttl_access_secs as u64)),
            l2_enabled: cfg.l2_enabled,
            l2_ttl: Duration::from_secs(cfg.l2_ttl_secs as u64),
            key_prefix: cfg.key_prefix,
            related_namespaces: cfg.related_namespaces,
        })
    }
}

// == Namespace Registry ==
/// Registry of every namespace known to the engine.
#[derive(Debug, Clone)]
pub struct NamespaceRegistry {
    /// Global kill switch; when false every read goes straight to the loader
    enabled: bool,
    namespaces: HashMap<&'static str, CacheNamespace>,
}

impl NamespaceRegistry {
    /// Validates and registers every namespace.
    ///
    /// Fails on duplicate names, dangling related-namespace references and
    /// key prefixes that overlap (one being a prefix of another would make
    /// prefix deletion wipe a neighbour's keys).
    pub fn build(enabled: bool, configs: Vec<CacheNamespaceConfig>) -> Result<Self> {
        let mut namespaces = HashMap::with_capacity(configs.len());
        for cfg in configs {
            let ns = CacheNamespace::try_from(cfg)?;
            if namespaces.contains_key(ns.name) {
                return Err(CacheError::InvalidConfig(format!(
                    "namespace registered twice: {}",
                    ns.name
                )));
            }
            namespaces.insert(ns.name, ns);
        }

        for ns in namespaces.values() {
            for related in &ns.related_namespaces {
                if !namespaces.contains_key(related) {
                    return Err(CacheError::InvalidConfig(format!(
                        "{}: related namespace {} is not registered",
                        ns.name, related
                    )));
                }
            }
            for other in namespaces.values() {
                if other.name != ns.name && other.key_prefix.starts_with(&ns.key_prefix) {
                    return Err(CacheError::InvalidConfig(format!(
                        "key prefix '{}' of {} overlaps '{}' of {}",
                        ns.key_prefix, ns.name, other.key_prefix, other.name
                    )));
                }
            }
        }

        Ok(Self {
            enabled,
            namespaces,
        })
    }

    /// Returns the namespace settings, if registered.
    pub fn get(&self, name: &str) -> Option<&CacheNamespace> {
        self.namespaces.get(name)
    }

    /// Like [`get`](Self::get) but an unknown name is an error.
    pub fn require(&self, name: &str) -> Result<&CacheNamespace> {
        self.get(name)
            .ok_or_else(|| CacheError::UnknownNamespace(name.to_string()))
    }

    /// Maps an arbitrary string onto the registered static name.
    pub fn resolve(&self, name: &str) -> Option<&'static str> {
        self.namespaces.get(name).map(|ns| ns.name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.namespaces.keys().copied()
    }

    pub fn is_globally_enabled(&self) -> bool {
        self.enabled
    }

    /// True when caching applies at all for `name`.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled
            && self
                .get(name)
                .is_some_and(|ns| ns.enabled && (ns.l1_enabled || ns.l2_enabled))
    }

    pub fn is_l1_enabled(&self, name: &str) -> bool {
        self.is_enabled(name) && self.get(name).is_some_and(|ns| ns.l1_enabled)
    }

    pub fn is_l2_enabled(&self, name: &str) -> bool {
        self.is_enabled(name) && self.get(name).is_some_and(|ns| ns.l2_enabled)
    }

    pub fn l2_ttl(&self, name: &str) -> Option<Duration> {
        self.get(name).map(|ns| ns.l2_ttl)
    }

    pub fn key_prefix(&self, name: &str) -> Option<&str> {
        self.get(name).map(|ns| ns.key_prefix.as_str())
    }

    /// `name` followed by its related namespaces, transitively, without repeats.
    pub fn with_related(&self, name: &'static str) -> Vec<&'static str> {
        let mut out = vec![name];
        let mut i = 0;
        while i < out.len() {
            if let Some(ns) = self.get(out[i]) {
                for related in &ns.related_namespaces {
                    if !out.contains(related) {
                        out.push(related);
                    }
                }
            }
            i += 1;
        }
        out
    }
}
