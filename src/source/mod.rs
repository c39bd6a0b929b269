//! Backing Store Boundary
//!
//! Read-only views of the relational source of truth. The cache calls
//! these on a miss and during warm-up; it never writes through them.
//! Errors are `anyhow` so any driver error can pass through the cache
//! untouched.

mod memory;

use async_trait::async_trait;

use crate::models::{Dict, DictItem, Menu, Permission, Role, SysConfig};

pub use memory::{InMemorySource, RoleMenuLink, RolePermissionLink, SeedData, UserRoleLink};

// == Dictionaries ==
#[async_trait]
pub trait DictSource: Send + Sync {
    async fn dict_by_id(&self, id: i64) -> anyhow::Result<Option<Dict>>;

    async fn dict_by_code(&self, code: &str) -> anyhow::Result<Option<Dict>>;

    async fn item_by_id(&self, id: i64) -> anyhow::Result<Option<DictItem>>;

    /// Enabled items of a dict ordered by sort.
    async fn items_by_dict_id(&self, dict_id: i64) -> anyhow::Result<Vec<DictItem>>;

    async fn items_by_dict_code(&self, code: &str) -> anyhow::Result<Vec<DictItem>>;

    async fn list_dicts(&self) -> anyhow::Result<Vec<Dict>>;
}

// == Roles ==
#[async_trait]
pub trait RoleSource: Send + Sync {
    async fn role_by_id(&self, id: i64) -> anyhow::Result<Option<Role>>;

    async fn role_by_code(&self, code: &str) -> anyhow::Result<Option<Role>>;

    async fn perm_ids_by_role(&self, role_id: i64) -> anyhow::Result<Vec<i64>>;

    async fn menu_ids_by_role(&self, role_id: i64) -> anyhow::Result<Vec<i64>>;

    async fn role_ids_by_user(&self, user_id: i64) -> anyhow::Result<Vec<i64>>;

    async fn list_roles(&self) -> anyhow::Result<Vec<Role>>;
}

// == Menus ==
#[async_trait]
pub trait MenuSource: Send + Sync {
    /// Enabled menus reachable through any of the user's roles, flat.
    async fn menus_by_user(&self, user_id: i64) -> anyhow::Result<Vec<Menu>>;

    /// Enabled menus assigned to a role, flat.
    async fn menus_by_role(&self, role_id: i64) -> anyhow::Result<Vec<Menu>>;

    async fn list_menus(&self) -> anyhow::Result<Vec<Menu>>;

    async fn role_ids_with_menus(&self) -> anyhow::Result<Vec<i64>>;
}

// == Permissions ==
#[async_trait]
pub trait PermissionSource: Send + Sync {
    async fn permissions_by_user(&self, user_id: i64) -> anyhow::Result<Vec<Permission>>;

    /// Identifier strings only; a projection of `permissions_by_user`.
    async fn perms_by_user(&self, user_id: i64) -> anyhow::Result<Vec<String>>;

    async fn permissions_by_role(&self, role_id: i64) -> anyhow::Result<Vec<Permission>>;

    async fn role_ids_with_permissions(&self) -> anyhow::Result<Vec<i64>>;
}

// == System Config ==
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn config_by_key(&self, key: &str) -> anyhow::Result<Option<SysConfig>>;

    async fn list_configs(&self) -> anyhow::Result<Vec<SysConfig>>;
}
