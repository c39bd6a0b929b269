//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache engine and its admin surface.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Configuration rejected at startup
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Namespace was never registered
    #[error("Unknown cache namespace: {0}")]
    UnknownNamespace(String),

    /// Domain name not recognised by the admin surface
    #[error("Unknown cache domain: {0}")]
    UnknownDomain(String),

    /// Key qualifier could not be parsed
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// Value could not be (de)serialized for the shared tier
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shared tier (L2) operation failed
    #[error("Shared cache error: {0}")]
    L2(String),

    /// Backing store failure, passed through untouched
    #[error(transparent)]
    Source(#[from] anyhow::Error),

    /// Warm-up could not enumerate its root entities
    #[error("Warm-up failed for {domain}: {reason}")]
    WarmUp { domain: String, reason: String },

    /// Engine has been shut down
    #[error("Cache engine is shutting down")]
    ShuttingDown,
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::L2(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        CacheError::L2(format!("connection pool: {}", err))
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::UnknownNamespace(_) | CacheError::UnknownDomain(_) => {
                StatusCode::NOT_FOUND
            }
            CacheError::InvalidKey(_) | CacheError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            CacheError::ShuttingDown | CacheError::L2(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Serialization(_) | CacheError::Source(_) | CacheError::WarmUp { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_is_transparent() {
        let err = CacheError::from(anyhow::anyhow!("db down"));
        assert_eq!(err.to_string(), "db down");
    }

    #[test]
    fn test_status_mapping() {
        let resp = CacheError::UnknownDomain("nope".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = CacheError::InvalidKey("x".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = CacheError::ShuttingDown.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
