//! Menu Cache
//!
//! `userMenus` holds the resolved navigation tree per user and
//! `roleMenuList` the flat enabled menu list per role. Trees are rebuilt
//! from flat lists at load time, so any menu change clears the whole
//! domain instead of chasing affected keys.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::{changed_since, ns, Domain};
use crate::cache::{CacheKey, TwoTierCache};
use crate::error::Result;
use crate::models::{Menu, MenuNode};
use crate::source::MenuSource;
use crate::tasks::{WarmUpReport, WarmUpScheduler};

// == Tree Builder ==
/// Assembles flat menus into a forest.
///
/// Roots are menus without a parent (or parent `0`). Siblings are ordered
/// by `sort`, a missing sort counting as `0`; ties keep input order.
/// Menus whose parent is not in the list are dropped.
pub fn build_menu_tree(menus: Vec<Menu>) -> Vec<MenuNode> {
    let mut roots = Vec::new();
    let mut children: HashMap<i64, Vec<Menu>> = HashMap::new();

    for menu in menus {
        match menu.parent_id {
            Some(parent) if !menu.is_root() => children.entry(parent).or_default().push(menu),
            _ => roots.push(menu),
        }
    }

    attach(roots, &mut children)
}

fn attach(mut level: Vec<Menu>, children: &mut HashMap<i64, Vec<Menu>>) -> Vec<MenuNode> {
    level.sort_by_key(|menu| menu.sort.unwrap_or(0));
    level
        .into_iter()
        .map(|menu| {
            let kids = children.remove(&menu.id).unwrap_or_default();
            MenuNode {
                children: attach(kids, children),
                menu,
            }
        })
        .collect()
}

// == Menu Cache ==
#[derive(Clone)]
pub struct MenuCache {
    engine: Arc<TwoTierCache>,
    source: Arc<dyn MenuSource>,
}

impl MenuCache {
    pub fn new(engine: Arc<TwoTierCache>, source: Arc<dyn MenuSource>) -> Self {
        Self { engine, source }
    }

    // == Reads ==
    /// The menu tree visible to a user through all of their roles.
    pub async fn get_user_menu_tree(&self, user_id: i64) -> Result<Vec<MenuNode>> {
        let tree = self
            .engine
            .get(&CacheKey::id(ns::USER_MENUS, user_id), || async move {
                let menus = self.source.menus_by_user(user_id).await?;
                anyhow::Ok(Some(build_menu_tree(menus)))
            })
            .await?;
        Ok(tree.unwrap_or_default())
    }

    /// Enabled menus assigned to a role, flat and ordered.
    pub async fn get_role_menus(&self, role_id: i64) -> Result<Vec<Menu>> {
        let menus = self
            .engine
            .get(&CacheKey::id(ns::ROLE_MENU_LIST, role_id), || async move {
                self.source.menus_by_role(role_id).await.map(Some)
            })
            .await?;
        Ok(menus.unwrap_or_default())
    }

    // == Explicit Population ==
    pub async fn cache_user_menu_tree(&self, user_id: i64, tree: &[MenuNode]) -> Result<()> {
        self.engine
            .put(&CacheKey::id(ns::USER_MENUS, user_id), &tree.to_vec())
            .await
    }

    pub async fn cache_role_menus(&self, role_id: i64, menus: &[Menu]) -> Result<()> {
        self.engine
            .put(&CacheKey::id(ns::ROLE_MENU_LIST, role_id), &menus.to_vec())
            .await
    }

    // == Eviction ==
    /// Called when the user's role assignment changed.
    pub async fn evict_user_menus(&self, user_id: i64) -> Result<()> {
        self.engine
            .evict(&CacheKey::id(ns::USER_MENUS, user_id))
            .await
    }

    pub async fn evict_role_menus(&self, role_id: i64) -> Result<()> {
        self.engine
            .evict(&CacheKey::id(ns::ROLE_MENU_LIST, role_id))
            .await
    }

    /// Any menu create, update or delete: every cached tree may be stale.
    pub async fn on_menu_changed(&self, menu_id: i64) -> Result<()> {
        info!(menu_id, "menu changed, clearing menu caches");
        self.evict_all().await
    }

    pub async fn evict_all(&self) -> Result<()> {
        self.engine.evict_all(Domain::Menu.namespaces()).await
    }

    // == Refresh ==
    /// Clears the domain if any menu was updated at or after `since`.
    pub async fn refresh_changed_since(&self, since: DateTime<Utc>) -> Result<bool> {
        let menus = self.source.list_menus().await?;
        let changed = menus.iter().any(|m| changed_since(m.updated_at, since));
        if changed {
            self.evict_all().await?;
        }
        Ok(changed)
    }

    // == Warm-Up ==
    /// Caches the flat menu list of every role that has menus.
    pub async fn warm_up(&self, scheduler: &WarmUpScheduler) -> Result<WarmUpReport> {
        if !Domain::Menu.is_enabled(&self.engine) {
            return Ok(WarmUpReport::skipped(Domain::Menu.as_str()));
        }
        let role_ids = self.source.role_ids_with_menus().await?;
        let this = self.clone();
        let report = scheduler
            .run(Domain::Menu.as_str(), role_ids, move |role_id: i64| {
                let this = this.clone();
                async move {
                    let menus = this.source.menus_by_role(role_id).await?;
                    this.cache_role_menus(role_id, &menus).await
                }
            })
            .await;
        Ok(report)
    }
}
