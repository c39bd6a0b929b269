//! Reference entities and admin API models
//!
//! Entities are the rows the cache holds copies of; requests and responses
//! are the DTOs of the administrative HTTP surface.

pub mod entities;
pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use entities::{
    Dict, DictItem, Menu, MenuNode, Permission, Role, SysConfig, STATUS_ENABLED,
};
pub use requests::KeyPath;
pub use responses::{
    ErrorResponse, EvictResponse, HealthResponse, RefreshResponse, StatsResponse, WarmUpResponse,
};
