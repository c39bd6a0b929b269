//! refcache - two-tier read-through cache for reference data
//!
//! Roles, menus, permissions, dictionaries and system settings are read
//! through a per-instance L1 and an optional shared L2 before falling back
//! to the backing store.

pub mod api;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod models;
pub mod source;
pub mod tasks;

pub use api::{create_router, AppState};
pub use cache::{CacheKey, TwoTierCache};
pub use config::Config;
pub use domain::{Domain, DomainCaches};
pub use error::{CacheError, Result};
pub use tasks::{spawn_cleanup_task, spawn_refresh_task, spawn_warmup_task};
