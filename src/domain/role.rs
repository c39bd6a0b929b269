//! Role Cache
//!
//! Roles are cached by id and by code. Role-to-permission and role-to-menu
//! assignments are cached as id lists only; callers resolve the ids
//! through the permission and menu caches. A user's role list is cached as
//! ids too and re-resolved through the by-id role cache.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{changed_since, ns, Domain};
use crate::cache::{CacheKey, TwoTierCache};
use crate::error::Result;
use crate::models::Role;
use crate::source::RoleSource;
use crate::tasks::{WarmUpReport, WarmUpScheduler};

#[derive(Clone)]
pub struct RoleCache {
    engine: Arc<TwoTierCache>,
    source: Arc<dyn RoleSource>,
}

impl RoleCache {
    pub fn new(engine: Arc<TwoTierCache>, source: Arc<dyn RoleSource>) -> Self {
        Self { engine, source }
    }

    // == Reads ==
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Role>> {
        self.engine
            .get(&CacheKey::id(ns::ROLE, id), || self.load_by_id(id))
            .await
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Option<Role>> {
        self.engine
            .get(&CacheKey::code(ns::ROLE, code), || self.load_by_code(code))
            .await
    }

    /// Permission ids assigned to the role.
    pub async fn get_perm_ids(&self, role_id: i64) -> Result<Vec<i64>> {
        let ids = self
            .engine
            .get(&CacheKey::id(ns::ROLE_PERMS, role_id), || async move {
                self.source.perm_ids_by_role(role_id).await.map(Some)
            })
            .await?;
        Ok(ids.unwrap_or_default())
    }

    /// Menu ids assigned to the role.
    pub async fn get_menu_ids(&self, role_id: i64) -> Result<Vec<i64>> {
        let ids = self
            .engine
            .get(&CacheKey::id(ns::ROLE_MENUS, role_id), || async move {
                self.source.menu_ids_by_role(role_id).await.map(Some)
            })
            .await?;
        Ok(ids.unwrap_or_default())
    }

    pub async fn get_user_role_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let ids = self
            .engine
            .get(&CacheKey::id(ns::USER_ROLES, user_id), || async move {
                self.source.role_ids_by_user(user_id).await.map(Some)
            })
            .await?;
        Ok(ids.unwrap_or_default())
    }

    /// The user's roles, resolved one by one through the role cache.
    /// Ids whose role no longer exists are skipped.
    pub async fn get_user_roles(&self, user_id: i64) -> Result<Vec<Role>> {
        let ids = self.get_user_role_ids(user_id).await?;
        let mut roles = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_by_id(id).await? {
                Some(role) => roles.push(role),
                None => debug!(user_id, role_id = id, "user references a missing role"),
            }
        }
        Ok(roles)
    }

    // == Loaders ==
    async fn load_by_id(&self, id: i64) -> anyhow::Result<Option<Role>> {
        let role = self.source.role_by_id(id).await?;
        if let Some(role) = &role {
            self.put_alias(&CacheKey::code(ns::ROLE, &role.code), role).await;
        }
        Ok(role)
    }

    async fn load_by_code(&self, code: &str) -> anyhow::Result<Option<Role>> {
        let role = self.source.role_by_code(code).await?;
        if let Some(role) = &role {
            self.put_alias(&CacheKey::id(ns::ROLE, role.id), role).await;
        }
        Ok(role)
    }

    async fn put_alias(&self, key: &CacheKey, role: &Role) {
        if let Err(e) = self.engine.put(key, role).await {
            warn!(key = %key, error = %e, "failed to cache role alias");
        }
    }

    // == Explicit Population ==
    pub async fn cache_role(&self, role: &Role) -> Result<()> {
        self.engine.put(&CacheKey::id(ns::ROLE, role.id), role).await?;
        self.engine
            .put(&CacheKey::code(ns::ROLE, &role.code), role)
            .await
    }

    pub async fn cache_perm_ids(&self, role_id: i64, perm_ids: &[i64]) -> Result<()> {
        self.engine
            .put(&CacheKey::id(ns::ROLE_PERMS, role_id), &perm_ids.to_vec())
            .await
    }

    pub async fn cache_menu_ids(&self, role_id: i64, menu_ids: &[i64]) -> Result<()> {
        self.engine
            .put(&CacheKey::id(ns::ROLE_MENUS, role_id), &menu_ids.to_vec())
            .await
    }

    pub async fn cache_user_role_ids(&self, user_id: i64, role_ids: &[i64]) -> Result<()> {
        self.engine
            .put(&CacheKey::id(ns::USER_ROLES, user_id), &role_ids.to_vec())
            .await
    }

    // == Eviction ==
    /// Evicts the role under both id and code.
    ///
    /// Users holding the role keep their cached role id lists; those
    /// entries stay valid because they only hold ids.
    pub async fn evict_role(&self, id: i64) -> Result<()> {
        let id_key = CacheKey::id(ns::ROLE, id);
        let code = match self.engine.peek::<Role>(&id_key).await {
            Some(role) => Some(role.code),
            None => match self.source.role_by_id(id).await {
                Ok(found) => found.map(|r| r.code),
                Err(e) => {
                    warn!(role_id = id, error = %e, "could not resolve role code, evicting by id only");
                    None
                }
            },
        };

        self.engine.evict(&id_key).await?;
        if let Some(code) = code {
            self.engine.evict(&CacheKey::code(ns::ROLE, code)).await?;
        }
        Ok(())
    }

    pub async fn evict_role_by_code(&self, code: &str) -> Result<()> {
        let code_key = CacheKey::code(ns::ROLE, code);
        let id = match self.engine.peek::<Role>(&code_key).await {
            Some(role) => Some(role.id),
            None => self
                .source
                .role_by_code(code)
                .await
                .unwrap_or_else(|e| {
                    warn!(role_code = code, error = %e, "could not resolve role id, evicting by code only");
                    None
                })
                .map(|r| r.id),
        };

        self.engine.evict(&code_key).await?;
        if let Some(id) = id {
            self.engine.evict(&CacheKey::id(ns::ROLE, id)).await?;
        }
        Ok(())
    }

    /// Called after the role's permission assignment changed.
    pub async fn evict_perm_ids(&self, role_id: i64) -> Result<()> {
        self.engine
            .evict(&CacheKey::id(ns::ROLE_PERMS, role_id))
            .await
    }

    /// Called after the role's menu assignment changed.
    pub async fn evict_menu_ids(&self, role_id: i64) -> Result<()> {
        self.engine
            .evict(&CacheKey::id(ns::ROLE_MENUS, role_id))
            .await
    }

    pub async fn evict_user_roles(&self, user_id: i64) -> Result<()> {
        self.engine
            .evict(&CacheKey::id(ns::USER_ROLES, user_id))
            .await
    }

    pub async fn evict_all(&self) -> Result<()> {
        self.engine.evict_all(Domain::Role.namespaces()).await
    }

    // == Refresh ==
    /// Evicts every role updated at or after `since`, with its id lists.
    pub async fn refresh_changed_since(&self, since: DateTime<Utc>) -> Result<usize> {
        let roles = self.source.list_roles().await?;
        let mut evicted = 0;
        for role in roles.iter().filter(|r| changed_since(r.updated_at, since)) {
            self.evict_role(role.id).await?;
            self.evict_perm_ids(role.id).await?;
            self.evict_menu_ids(role.id).await?;
            evicted += 1;
        }
        Ok(evicted)
    }

    // == Warm-Up ==
    /// Caches every role with its permission and menu id lists.
    pub async fn warm_up(&self, scheduler: &WarmUpScheduler) -> Result<WarmUpReport> {
        if !Domain::Role.is_enabled(&self.engine) {
            return Ok(WarmUpReport::skipped(Domain::Role.as_str()));
        }
        let roles = self.source.list_roles().await?;
        let this = self.clone();
        let report = scheduler
            .run(Domain::Role.as_str(), roles, move |role: Role| {
                let this = this.clone();
                async move {
                    this.cache_role(&role).await?;
                    let perm_ids = this.source.perm_ids_by_role(role.id).await?;
                    this.cache_perm_ids(role.id, &perm_ids).await?;
                    let menu_ids = this.source.menu_ids_by_role(role.id).await?;
                    this.cache_menu_ids(role.id, &menu_ids).await
                }
            })
            .await;
        Ok(report)
    }
}
