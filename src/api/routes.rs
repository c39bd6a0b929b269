//! API Routes
//!
//! Configures the Axum router with the administrative cache endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    evict_domain_handler, evict_key_handler, health_handler, refresh_dict_handler,
    stats_handler, warm_up_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check endpoint
/// - `GET /cache/stats` - Per-namespace cache statistics
/// - `POST /cache/:domain/warm-up` - Warm one domain now
/// - `DELETE /cache/:domain` - Clear one domain in both tiers
/// - `DELETE /cache/keys/:namespace/:qualifier` - Evict a single key
/// - `POST /cache/dict/refresh/:code` - Evict and reload one dict
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/cache/stats", get(stats_handler))
        .route("/cache/:domain/warm-up", post(warm_up_handler))
        .route("/cache/:domain", delete(evict_domain_handler))
        .route("/cache/keys/:namespace/:qualifier", delete(evict_key_handler))
        .route("/cache/dict/refresh/:code", post(refresh_dict_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::util::ServiceExt;

    use crate::cache::{NamespaceRegistry, TwoTierCache};
    use crate::domain::{default_namespace_configs, DomainCaches};
    use crate::source::InMemorySource;
    use crate::tasks::WarmUpScheduler;

    fn create_test_app() -> Router {
        let registry = NamespaceRegistry::build(true, default_namespace_configs()).unwrap();
        let engine = Arc::new(TwoTierCache::local(registry));
        let caches = DomainCaches::new(engine, Arc::new(InMemorySource::default()));
        create_router(AppState::new(caches, WarmUpScheduler::default()))
    }

    async fn send(method: &str, uri: &str) -> StatusCode {
        create_test_app()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        assert_eq!(send("GET", "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        assert_eq!(send("GET", "/cache/stats").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_warm_up_endpoint() {
        assert_eq!(send("POST", "/cache/role/warm-up").await, StatusCode::OK);
        assert_eq!(send("POST", "/cache/orders/warm-up").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_evict_key_endpoint() {
        assert_eq!(send("DELETE", "/cache/keys/role/7").await, StatusCode::OK);
        assert_eq!(send("DELETE", "/cache/keys/role/seven").await, StatusCode::BAD_REQUEST);
        assert_eq!(send("DELETE", "/cache/keys/orders/7").await, StatusCode::NOT_FOUND);
    }
}
