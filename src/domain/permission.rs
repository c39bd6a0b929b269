//! Permission Cache
//!
//! A user's permissions are cached twice: as full objects
//! (`userPermissions`) and as bare identifier strings (`userPerms`) for
//! authorization checks that never need the objects. Both derive from the
//! same rows, so evicting the objects evicts the identifiers.

use std::sync::Arc;

use super::{ns, Domain};
use crate::cache::{CacheKey, CascadeRules, TwoTierCache};
use crate::error::Result;
use crate::models::Permission;
use crate::source::PermissionSource;
use crate::tasks::{WarmUpReport, WarmUpScheduler};

// == Cascade ==
/// `userPermissions:<user>` takes `userPerms:<user>` with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionCascade;

impl CascadeRules for PermissionCascade {
    fn dependents(&self, key: &CacheKey) -> Vec<CacheKey> {
        if key.namespace() == ns::USER_PERMISSIONS {
            vec![CacheKey::new(ns::USER_PERMS, key.qualifier().clone())]
        } else {
            Vec::new()
        }
    }
}

// == Permission Cache ==
#[derive(Clone)]
pub struct PermissionCache {
    engine: Arc<TwoTierCache>,
    source: Arc<dyn PermissionSource>,
}

impl PermissionCache {
    pub fn new(engine: Arc<TwoTierCache>, source: Arc<dyn PermissionSource>) -> Self {
        Self { engine, source }
    }

    // == Reads ==
    pub async fn get_user_permissions(&self, user_id: i64) -> Result<Vec<Permission>> {
        let perms = self
            .engine
            .get(&CacheKey::id(ns::USER_PERMISSIONS, user_id), || async move {
                self.source.permissions_by_user(user_id).await.map(Some)
            })
            .await?;
        Ok(perms.unwrap_or_default())
    }

    /// Identifier strings only, e.g. `system:user:list`.
    pub async fn get_user_perms(&self, user_id: i64) -> Result<Vec<String>> {
        let perms = self
            .engine
            .get(&CacheKey::id(ns::USER_PERMS, user_id), || async move {
                self.source.perms_by_user(user_id).await.map(Some)
            })
            .await?;
        Ok(perms.unwrap_or_default())
    }

    pub async fn has_perm(&self, user_id: i64, perm: &str) -> Result<bool> {
        Ok(self.get_user_perms(user_id).await?.iter().any(|p| p == perm))
    }

    pub async fn get_role_permissions(&self, role_id: i64) -> Result<Vec<Permission>> {
        let perms = self
            .engine
            .get(&CacheKey::id(ns::ROLE_PERMISSIONS, role_id), || async move {
                self.source.permissions_by_role(role_id).await.map(Some)
            })
            .await?;
        Ok(perms.unwrap_or_default())
    }

    // == Explicit Population ==
    pub async fn cache_user_permissions(&self, user_id: i64, perms: &[Permission]) -> Result<()> {
        self.engine
            .put(&CacheKey::id(ns::USER_PERMISSIONS, user_id), &perms.to_vec())
            .await
    }

    pub async fn cache_user_perms(&self, user_id: i64, perms: &[String]) -> Result<()> {
        self.engine
            .put(&CacheKey::id(ns::USER_PERMS, user_id), &perms.to_vec())
            .await
    }

    pub async fn cache_role_permissions(&self, role_id: i64, perms: &[Permission]) -> Result<()> {
        self.engine
            .put(&CacheKey::id(ns::ROLE_PERMISSIONS, role_id), &perms.to_vec())
            .await
    }

    // == Eviction ==
    /// Evicts both views of the user's permissions.
    pub async fn evict_user_permissions(&self, user_id: i64) -> Result<()> {
        self.engine
            .evict_cascade(
                &PermissionCascade,
                &CacheKey::id(ns::USER_PERMISSIONS, user_id),
            )
            .await
    }

    pub async fn evict_user_perms(&self, user_id: i64) -> Result<()> {
        self.engine
            .evict(&CacheKey::id(ns::USER_PERMS, user_id))
            .await
    }

    pub async fn evict_role_permissions(&self, role_id: i64) -> Result<()> {
        self.engine
            .evict(&CacheKey::id(ns::ROLE_PERMISSIONS, role_id))
            .await
    }

    pub async fn evict_all(&self) -> Result<()> {
        self.engine.evict_all(Domain::Permission.namespaces()).await
    }

    // == Warm-Up ==
    /// Caches the permission objects of every role that has any.
    pub async fn warm_up(&self, scheduler: &WarmUpScheduler) -> Result<WarmUpReport> {
        if !Domain::Permission.is_enabled(&self.engine) {
            return Ok(WarmUpReport::skipped(Domain::Permission.as_str()));
        }
        let role_ids = self.source.role_ids_with_permissions().await?;
        let this = self.clone();
        let report = scheduler
            .run(Domain::Permission.as_str(), role_ids, move |role_id: i64| {
                let this = this.clone();
                async move {
                    let perms = this.source.permissions_by_role(role_id).await?;
                    this.cache_role_permissions(role_id, &perms).await
                }
            })
            .await;
        Ok(report)
    }
}
