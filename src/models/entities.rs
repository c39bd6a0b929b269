//! Reference Entities
//!
//! Rows owned by the backing store. The cache only ever holds copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status value marking an enabled row.
pub const STATUS_ENABLED: i32 = 1;

fn enabled() -> i32 {
    STATUS_ENABLED
}

// == Dictionary ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dict {
    pub id: i64,
    pub dict_name: String,
    pub dict_code: String,
    #[serde(default)]
    pub sort: Option<i32>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default = "enabled")]
    pub status: i32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictItem {
    pub id: i64,
    pub dict_id: i64,
    pub item_text: String,
    pub item_value: String,
    #[serde(default)]
    pub sort: Option<i32>,
    #[serde(default = "enabled")]
    pub status: i32,
}

// == Role ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub sort: Option<i32>,
    #[serde(default = "enabled")]
    pub status: i32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

// == Menu ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Menu {
    pub id: i64,
    /// `None` or `0` marks a root menu
    #[serde(default)]
    pub parent_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub sort: Option<i32>,
    /// Permission identifier guarding the menu, e.g. `system:user:list`
    #[serde(default)]
    pub perms: Option<String>,
    #[serde(default = "enabled")]
    pub status: i32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Menu {
    pub fn is_root(&self) -> bool {
        matches!(self.parent_id, None | Some(0))
    }

    pub fn is_enabled(&self) -> bool {
        self.status == STATUS_ENABLED
    }
}

/// A menu with its resolved children, as handed to the navigation UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuNode {
    #[serde(flatten)]
    pub menu: Menu,
    #[serde(default)]
    pub children: Vec<MenuNode>,
}

// == Permission ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub id: i64,
    /// Identifier string checked by authorization, e.g. `system:role:edit`
    pub perm: String,
    pub name: String,
    #[serde(default)]
    pub menu_id: Option<i64>,
    #[serde(default)]
    pub menu_name: Option<String>,
}

// == System Config ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SysConfig {
    pub id: i64,
    pub config_key: String,
    pub config_value: String,
    #[serde(default)]
    pub config_name: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
}
