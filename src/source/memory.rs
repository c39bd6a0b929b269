//! In-Memory Backing Store
//!
//! A snapshot of the reference tables held in process, implementing every
//! source trait. Seeded from JSON; used by the binary and by tests.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::models::{Dict, DictItem, Menu, Permission, Role, SysConfig, STATUS_ENABLED};
use crate::source::{ConfigSource, DictSource, MenuSource, PermissionSource, RoleSource};

// == Seed Data ==
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub dicts: Vec<Dict>,
    pub dict_items: Vec<DictItem>,
    pub roles: Vec<Role>,
    pub menus: Vec<Menu>,
    pub permissions: Vec<Permission>,
    pub configs: Vec<SysConfig>,
    pub role_permissions: Vec<RolePermissionLink>,
    pub role_menus: Vec<RoleMenuLink>,
    pub user_roles: Vec<UserRoleLink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermissionLink {
    pub role_id: i64,
    pub permission_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMenuLink {
    pub role_id: i64,
    pub menu_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleLink {
    pub user_id: i64,
    pub role_id: i64,
}

// == In-Memory Source ==
#[derive(Debug, Default)]
pub struct InMemorySource {
    data: RwLock<SeedData>,
    /// Number of read calls served, across every trait
    reads: AtomicU64,
}

impl InMemorySource {
    pub fn new(data: SeedData) -> Self {
        Self {
            data: RwLock::new(data),
            reads: AtomicU64::new(0),
        }
    }

    /// Loads a JSON snapshot from disk.
    pub async fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading seed file {}", path.display()))?;
        let data: SeedData = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing seed file {}", path.display()))?;
        Ok(Self::new(data))
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Runs `f` against the snapshot, e.g. to simulate a write.
    pub async fn update<R>(&self, f: impl FnOnce(&mut SeedData) -> R) -> R {
        let mut data = self.data.write().await;
        f(&mut data)
    }

    async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, SeedData> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.data.read().await
    }
}

fn sort_key(sort: Option<i32>, id: i64) -> (i32, i64) {
    (sort.unwrap_or(0), id)
}

fn enabled_items(data: &SeedData, dict_id: i64) -> Vec<DictItem> {
    let mut items: Vec<DictItem> = data
        .dict_items
        .iter()
        .filter(|item| item.dict_id == dict_id && item.status == STATUS_ENABLED)
        .cloned()
        .collect();
    items.sort_by_key(|item| sort_key(item.sort, item.id));
    items
}

fn role_ids_of(data: &SeedData, user_id: i64) -> BTreeSet<i64> {
    data.user_roles
        .iter()
        .filter(|link| link.user_id == user_id)
        .map(|link| link.role_id)
        .collect()
}

fn menus_for_roles(data: &SeedData, role_ids: &BTreeSet<i64>) -> Vec<Menu> {
    let menu_ids: BTreeSet<i64> = data
        .role_menus
        .iter()
        .filter(|link| role_ids.contains(&link.role_id))
        .map(|link| link.menu_id)
        .collect();
    let mut menus: Vec<Menu> = data
        .menus
        .iter()
        .filter(|menu| menu_ids.contains(&menu.id) && menu.is_enabled())
        .cloned()
        .collect();
    menus.sort_by_key(|menu| sort_key(menu.sort, menu.id));
    menus
}

fn permissions_for_roles(data: &SeedData, role_ids: &BTreeSet<i64>) -> Vec<Permission> {
    let perm_ids: BTreeSet<i64> = data
        .role_permissions
        .iter()
        .filter(|link| role_ids.contains(&link.role_id))
        .map(|link| link.permission_id)
        .collect();
    let mut perms: Vec<Permission> = data
        .permissions
        .iter()
        .filter(|perm| perm_ids.contains(&perm.id))
        .cloned()
        .collect();
    perms.sort_by_key(|perm| perm.id);
    perms
}

#[async_trait]
impl DictSource for InMemorySource {
    async fn dict_by_id(&self, id: i64) -> anyhow::Result<Option<Dict>> {
        let data = self.read().await;
        Ok(data.dicts.iter().find(|d| d.id == id).cloned())
    }

    async fn dict_by_code(&self, code: &str) -> anyhow::Result<Option<Dict>> {
        let data = self.read().await;
        Ok(data.dicts.iter().find(|d| d.dict_code == code).cloned())
    }

    async fn item_by_id(&self, id: i64) -> anyhow::Result<Option<DictItem>> {
        let data = self.read().await;
        Ok(data.dict_items.iter().find(|item| item.id == id).cloned())
    }

    async fn items_by_dict_id(&self, dict_id: i64) -> anyhow::Result<Vec<DictItem>> {
        let data = self.read().await;
        Ok(enabled_items(&data, dict_id))
    }

    async fn items_by_dict_code(&self, code: &str) -> anyhow::Result<Vec<DictItem>> {
        let data = self.read().await;
        Ok(data
            .dicts
            .iter()
            .find(|d| d.dict_code == code)
            .map(|d| enabled_items(&data, d.id))
            .unwrap_or_default())
    }

    async fn list_dicts(&self) -> anyhow::Result<Vec<Dict>> {
        Ok(self.read().await.dicts.clone())
    }
}

#[async_trait]
impl RoleSource for InMemorySource {
    async fn role_by_id(&self, id: i64) -> anyhow::Result<Option<Role>> {
        let data = self.read().await;
        Ok(data.roles.iter().find(|r| r.id == id).cloned())
    }

    async fn role_by_code(&self, code: &str) -> anyhow::Result<Option<Role>> {
        let data = self.read().await;
        Ok(data.roles.iter().find(|r| r.code == code).cloned())
    }

    async fn perm_ids_by_role(&self, role_id: i64) -> anyhow::Result<Vec<i64>> {
        let data = self.read().await;
        let ids: BTreeSet<i64> = data
            .role_permissions
            .iter()
            .filter(|link| link.role_id == role_id)
            .map(|link| link.permission_id)
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn menu_ids_by_role(&self, role_id: i64) -> anyhow::Result<Vec<i64>> {
        let data = self.read().await;
        let ids: BTreeSet<i64> = data
            .role_menus
            .iter()
            .filter(|link| link.role_id == role_id)
            .map(|link| link.menu_id)
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn role_ids_by_user(&self, user_id: i64) -> anyhow::Result<Vec<i64>> {
        let data = self.read().await;
        Ok(role_ids_of(&data, user_id).into_iter().collect())
    }

    async fn list_roles(&self) -> anyhow::Result<Vec<Role>> {
        Ok(self.read().await.roles.clone())
    }
}

#[async_trait]
impl MenuSource for InMemorySource {
    async fn menus_by_user(&self, user_id: i64) -> anyhow::Result<Vec<Menu>> {
        let data = self.read().await;
        let roles = role_ids_of(&data, user_id);
        Ok(menus_for_roles(&data, &roles))
    }

    async fn menus_by_role(&self, role_id: i64) -> anyhow::Result<Vec<Menu>> {
        let data = self.read().await;
        Ok(menus_for_roles(&data, &BTreeSet::from([role_id])))
    }

    async fn list_menus(&self) -> anyhow::Result<Vec<Menu>> {
        Ok(self.read().await.menus.clone())
    }

    async fn role_ids_with_menus(&self) -> anyhow::Result<Vec<i64>> {
        let data = self.read().await;
        let ids: BTreeSet<i64> = data.role_menus.iter().map(|link| link.role_id).collect();
        Ok(ids.into_iter().collect())
    }
}

#[async_trait]
impl PermissionSource for InMemorySource {
    async fn permissions_by_user(&self, user_id: i64) -> anyhow::Result<Vec<Permission>> {
        let data = self.read().await;
        let roles = role_ids_of(&data, user_id);
        Ok(permissions_for_roles(&data, &roles))
    }

    async fn perms_by_user(&self, user_id: i64) -> anyhow::Result<Vec<String>> {
        let data = self.read().await;
        let roles = role_ids_of(&data, user_id);
        let perms: BTreeSet<String> = permissions_for_roles(&data, &roles)
            .into_iter()
            .map(|p| p.perm)
            .collect();
        Ok(perms.into_iter().collect())
    }

    async fn permissions_by_role(&self, role_id: i64) -> anyhow::Result<Vec<Permission>> {
        let data = self.read().await;
        Ok(permissions_for_roles(&data, &BTreeSet::from([role_id])))
    }

    async fn role_ids_with_permissions(&self) -> anyhow::Result<Vec<i64>> {
        let data = self.read().await;
        let ids: BTreeSet<i64> = data
            .role_permissions
            .iter()
            .map(|link| link.role_id)
            .collect();
        Ok(ids.into_iter().collect())
    }
}

#[async_trait]
impl ConfigSource for InMemorySource {
    async fn config_by_key(&self, key: &str) -> anyhow::Result<Option<SysConfig>> {
        let data = self.read().await;
        Ok(data.configs.iter().find(|c| c.config_key == key).cloned())
    }

    async fn list_configs(&self) -> anyhow::Result<Vec<SysConfig>> {
        Ok(self.read().await.configs.clone())
    }
}
