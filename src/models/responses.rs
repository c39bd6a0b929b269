//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::models::Dict;
use crate::tasks::WarmUpReport;

/// Response body for `GET /cache/stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Global cache switch
    pub enabled: bool,
    /// Shared tier backend, if one is attached
    pub l2_backend: Option<&'static str>,
    /// Hit rate over every namespace
    pub hit_rate: f64,
    pub namespaces: Vec<CacheStats>,
}

impl StatsResponse {
    /// Creates a new StatsResponse from per-namespace snapshots
    pub fn new(enabled: bool, l2_backend: Option<&'static str>, namespaces: Vec<CacheStats>) -> Self {
        let hits: u64 = namespaces.iter().map(|s| s.l1_hits + s.l2_hits).sum();
        let misses: u64 = namespaces.iter().map(|s| s.misses).sum();
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };
        Self {
            enabled,
            l2_backend,
            hit_rate,
            namespaces,
        }
    }
}

/// Response body for `POST /cache/:domain/warm-up`
#[derive(Debug, Clone, Serialize)]
pub struct WarmUpResponse {
    pub message: String,
    pub report: WarmUpReport,
}

impl WarmUpResponse {
    pub fn new(report: WarmUpReport) -> Self {
        let message = if report.skipped {
            format!("Caching is disabled for '{}', nothing warmed", report.domain)
        } else {
            format!(
                "Warmed {} of {} '{}' entries",
                report.succeeded, report.total, report.domain
            )
        };
        Self { message, report }
    }
}

/// Response body for the eviction endpoints
#[derive(Debug, Clone, Serialize)]
pub struct EvictResponse {
    /// Success message
    pub message: String,
    /// What was evicted: a domain name or a `namespace/qualifier` key
    pub target: String,
}

impl EvictResponse {
    pub fn domain(domain: impl Into<String>) -> Self {
        let target = domain.into();
        Self {
            message: format!("Cache for domain '{}' cleared", target),
            target,
        }
    }

    pub fn key(key: impl Into<String>) -> Self {
        let target = key.into();
        Self {
            message: format!("Key '{}' evicted", target),
            target,
        }
    }
}

/// Response body for `POST /cache/dict/refresh/:code`
#[derive(Debug, Clone, Serialize)]
pub struct RefreshResponse {
    pub code: String,
    /// False when the dict no longer exists in the backing store
    pub found: bool,
    pub dict: Option<Dict>,
}

impl RefreshResponse {
    pub fn new(code: impl Into<String>, dict: Option<Dict>) -> Self {
        Self {
            code: code.into(),
            found: dict.is_some(),
            dict,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Shared tier backend, if one is attached
    pub l2_backend: Option<&'static str>,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy(l2_backend: Option<&'static str>) -> Self {
        Self {
            status: "healthy".to_string(),
            l2_backend,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
