//! Domain Cache Managers
//!
//! Each manager wraps the shared [`TwoTierCache`] with one domain's key
//! shapes and invalidation fan-out. Managers are cheap to clone; they hold
//! the engine and their backing source behind `Arc`s.

mod dict;
mod menu;
mod permission;
mod role;
mod sysconfig;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{CacheNamespaceConfig, TwoTierCache};
use crate::error::{CacheError, Result};
use crate::source::{ConfigSource, DictSource, MenuSource, PermissionSource, RoleSource};
use crate::tasks::{WarmUpReport, WarmUpScheduler};

pub use dict::{DictCache, DictCascade};
pub use menu::{build_menu_tree, MenuCache};
pub use permission::{PermissionCache, PermissionCascade};
pub use role::RoleCache;
pub use sysconfig::{ConfigCache, ConfigCascade};

// == Namespaces ==
/// Names of every registered namespace.
pub mod ns {
    pub const DICT: &str = "dict";
    pub const DICT_ITEM: &str = "dictItem";
    pub const DICT_ITEMS: &str = "dictItems";

    pub const ROLE: &str = "role";
    pub const ROLE_PERMS: &str = "rolePerms";
    pub const ROLE_MENUS: &str = "roleMenus";
    pub const USER_ROLES: &str = "userRoles";

    pub const USER_MENUS: &str = "userMenus";
    pub const ROLE_MENU_LIST: &str = "roleMenuList";

    pub const USER_PERMISSIONS: &str = "userPermissions";
    pub const USER_PERMS: &str = "userPerms";
    pub const ROLE_PERMISSIONS: &str = "rolePermissions";

    pub const CONFIG: &str = "config";
    pub const CONFIG_VALUE: &str = "configValue";
}

// == Domain ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Dict,
    Role,
    Menu,
    Permission,
    Config,
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::Dict,
        Domain::Role,
        Domain::Menu,
        Domain::Permission,
        Domain::Config,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Dict => "dict",
            Domain::Role => "role",
            Domain::Menu => "menu",
            Domain::Permission => "permission",
            Domain::Config => "config",
        }
    }

    /// Prefix of the per-domain environment overrides, e.g. `DICT_CACHE_*`.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Domain::Dict => "DICT",
            Domain::Role => "ROLE",
            Domain::Menu => "MENU",
            Domain::Permission => "PERMISSION",
            Domain::Config => "CONFIG",
        }
    }

    /// Every namespace owned by the domain.
    pub fn namespaces(&self) -> &'static [&'static str] {
        match self {
            Domain::Dict => &[ns::DICT, ns::DICT_ITEM, ns::DICT_ITEMS],
            Domain::Role => &[ns::ROLE, ns::ROLE_PERMS, ns::ROLE_MENUS, ns::USER_ROLES],
            Domain::Menu => &[ns::USER_MENUS, ns::ROLE_MENU_LIST],
            Domain::Permission => &[ns::USER_PERMISSIONS, ns::USER_PERMS, ns::ROLE_PERMISSIONS],
            Domain::Config => &[ns::CONFIG, ns::CONFIG_VALUE],
        }
    }

    /// Default namespace settings for the domain.
    pub fn default_configs(&self) -> Vec<CacheNamespaceConfig> {
        let base = |name: &'static str| {
            let mut cfg = CacheNamespaceConfig::new(name);
            if *self == Domain::Menu {
                cfg.l1_ttl_write_secs = 15 * 60;
                cfg.l1_ttl_access_secs = 10 * 60;
            }
            cfg
        };

        match self {
            Domain::Dict => vec![
                base(ns::DICT).related(&[ns::DICT_ITEMS]),
                base(ns::DICT_ITEM),
                base(ns::DICT_ITEMS),
            ],
            Domain::Role => vec![
                base(ns::ROLE).related(&[ns::ROLE_PERMS, ns::ROLE_MENUS]),
                base(ns::ROLE_PERMS),
                base(ns::ROLE_MENUS),
                base(ns::USER_ROLES),
            ],
            Domain::Menu => vec![base(ns::USER_MENUS), base(ns::ROLE_MENU_LIST)],
            Domain::Permission => vec![
                base(ns::USER_PERMISSIONS).related(&[ns::USER_PERMS]),
                base(ns::USER_PERMS),
                base(ns::ROLE_PERMISSIONS),
            ],
            Domain::Config => vec![
                base(ns::CONFIG).related(&[ns::CONFIG_VALUE]),
                base(ns::CONFIG_VALUE),
            ],
        }
    }

    /// True when at least one of the domain's namespaces caches anything.
    pub fn is_enabled(&self, engine: &TwoTierCache) -> bool {
        self.namespaces()
            .iter()
            .any(|name| engine.registry().is_enabled(name))
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CacheError::UnknownDomain(s.to_string()))
    }
}

/// Default settings for every namespace of every domain.
pub fn default_namespace_configs() -> Vec<CacheNamespaceConfig> {
    Domain::ALL
        .iter()
        .flat_map(|d| d.default_configs())
        .collect()
}

// == Refresh Report ==
/// Result of evicting recently changed entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshReport {
    pub dicts: usize,
    pub roles: usize,
    /// True when a recent menu change cleared the menu domain
    pub menus_cleared: bool,
}

// == Domain Caches ==
/// All five managers over one engine.
#[derive(Clone)]
pub struct DomainCaches {
    engine: Arc<TwoTierCache>,
    pub dict: DictCache,
    pub role: RoleCache,
    pub menu: MenuCache,
    pub permission: PermissionCache,
    pub config: ConfigCache,
}

impl DomainCaches {
    /// Wires every manager to the same store implementing all source traits.
    pub fn new<S>(engine: Arc<TwoTierCache>, source: Arc<S>) -> Self
    where
        S: DictSource + RoleSource + MenuSource + PermissionSource + ConfigSource + 'static,
    {
        Self {
            dict: DictCache::new(Arc::clone(&engine), source.clone()),
            role: RoleCache::new(Arc::clone(&engine), source.clone()),
            menu: MenuCache::new(Arc::clone(&engine), source.clone()),
            permission: PermissionCache::new(Arc::clone(&engine), source.clone()),
            config: ConfigCache::new(Arc::clone(&engine), source),
            engine,
        }
    }

    pub fn engine(&self) -> &Arc<TwoTierCache> {
        &self.engine
    }

    // == Warm-Up ==
    pub async fn warm_up(&self, domain: Domain, scheduler: &WarmUpScheduler) -> Result<WarmUpReport> {
        if self.engine.is_shutting_down() {
            return Err(CacheError::ShuttingDown);
        }
        match domain {
            Domain::Dict => self.dict.warm_up(scheduler).await,
            Domain::Role => self.role.warm_up(scheduler).await,
            Domain::Menu => self.menu.warm_up(scheduler).await,
            Domain::Permission => self.permission.warm_up(scheduler).await,
            Domain::Config => self.config.warm_up(scheduler).await,
        }
    }

    /// Warms every domain in turn. A domain whose roots cannot be listed
    /// is reported as a failed run instead of stopping the others.
    pub async fn warm_up_all(&self, scheduler: &WarmUpScheduler) -> Result<Vec<WarmUpReport>> {
        let mut reports = Vec::with_capacity(Domain::ALL.len());
        for domain in Domain::ALL {
            match self.warm_up(domain, scheduler).await {
                Ok(report) => reports.push(report),
                Err(CacheError::ShuttingDown) => return Err(CacheError::ShuttingDown),
                Err(e) => {
                    warn!(domain = %domain, error = %e, "warm-up could not start");
                    reports.push(WarmUpReport {
                        domain: domain.to_string(),
                        failed: 1,
                        total: 1,
                        ..Default::default()
                    });
                }
            }
        }
        Ok(reports)
    }

    // == Evict All ==
    pub async fn evict_all(&self, domain: Domain) -> Result<()> {
        match domain {
            Domain::Dict => self.dict.evict_all().await,
            Domain::Role => self.role.evict_all().await,
            Domain::Menu => self.menu.evict_all().await,
            Domain::Permission => self.permission.evict_all().await,
            Domain::Config => self.config.evict_all().await,
        }
    }

    // == Refresh ==
    /// Evicts every dict, role and menu changed within `window`.
    pub async fn refresh_recent(&self, window: Duration) -> Result<RefreshReport> {
        let window = chrono::Duration::from_std(window)
            .map_err(|e| CacheError::InvalidConfig(format!("refresh window: {}", e)))?;
        let since: DateTime<Utc> = Utc::now() - window;

        let report = RefreshReport {
            dicts: self.dict.refresh_changed_since(since).await?,
            roles: self.role.refresh_changed_since(since).await?,
            menus_cleared: self.menu.refresh_changed_since(since).await?,
        };

        if report.dicts > 0 || report.roles > 0 || report.menus_cleared {
            info!(
                dicts = report.dicts,
                roles = report.roles,
                menus_cleared = report.menus_cleared,
                "refreshed recently changed entries"
            );
        }
        Ok(report)
    }
}

/// True when `updated_at` is set and not older than `since`.
pub(crate) fn changed_since(updated_at: Option<DateTime<Utc>>, since: DateTime<Utc>) -> bool {
    updated_at.is_some_and(|at| at >= since)
}
