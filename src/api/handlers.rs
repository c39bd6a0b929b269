//! API Handlers
//!
//! HTTP request handlers for the administrative cache endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::domain::{Domain, DomainCaches};
use crate::error::Result;
use crate::models::{
    EvictResponse, HealthResponse, KeyPath, RefreshResponse, StatsResponse, WarmUpResponse,
};
use crate::tasks::WarmUpScheduler;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Domain managers over the shared engine
    pub caches: DomainCaches,
    /// Scheduler used by on-demand warm-ups
    pub scheduler: WarmUpScheduler,
}

impl AppState {
    pub fn new(caches: DomainCaches, scheduler: WarmUpScheduler) -> Self {
        Self { caches, scheduler }
    }
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = state.caches.engine();
    Json(HealthResponse::healthy(engine.l2_backend()))
}

/// Handler for GET /cache/stats
///
/// Returns per-namespace counters, sorted by namespace.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let engine = state.caches.engine();
    Json(StatsResponse::new(
        engine.registry().is_globally_enabled(),
        engine.l2_backend(),
        engine.stats().await,
    ))
}

/// Handler for POST /cache/:domain/warm-up
pub async fn warm_up_handler(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<WarmUpResponse>> {
    let domain: Domain = domain.parse()?;
    let report = state.caches.warm_up(domain, &state.scheduler).await?;
    Ok(Json(WarmUpResponse::new(report)))
}

/// Handler for DELETE /cache/:domain
///
/// Clears every namespace of the domain in both tiers.
pub async fn evict_domain_handler(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<EvictResponse>> {
    let domain: Domain = domain.parse()?;
    state.caches.evict_all(domain).await?;
    info!(domain = %domain, "domain cache cleared on request");
    Ok(Json(EvictResponse::domain(domain.as_str())))
}

/// Handler for DELETE /cache/keys/:namespace/:qualifier
///
/// Evicts one key without cascading.
pub async fn evict_key_handler(
    State(state): State<AppState>,
    Path(path): Path<KeyPath>,
) -> Result<Json<EvictResponse>> {
    let engine = state.caches.engine();
    let key = path.to_key(engine.registry())?;
    engine.evict(&key).await?;
    Ok(Json(EvictResponse::key(key.to_string())))
}

/// Handler for POST /cache/dict/refresh/:code
///
/// Evicts the dict behind `code` under both aliases and reloads it.
pub async fn refresh_dict_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<RefreshResponse>> {
    let dict = state.caches.dict.refresh_by_code(&code).await?;
    Ok(Json(RefreshResponse::new(code, dict)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cache::{NamespaceRegistry, TwoTierCache};
    use crate::domain::default_namespace_configs;
    use crate::error::CacheError;
    use crate::models::Dict;
    use crate::source::{InMemorySource, SeedData};

    fn state() -> AppState {
        let registry = NamespaceRegistry::build(true, default_namespace_configs()).unwrap();
        let engine = Arc::new(TwoTierCache::local(registry));
        let source = Arc::new(InMemorySource::new(SeedData {
            dicts: vec![Dict {
                id: 5,
                dict_name: "Sex".into(),
                dict_code: "sex".into(),
                sort: None,
                remark: None,
                status: 1,
                updated_at: None,
            }],
            ..Default::default()
        }));
        AppState::new(DomainCaches::new(engine, source), WarmUpScheduler::default())
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler(State(state())).await;
        assert_eq!(response.status, "healthy");
        assert!(response.l2_backend.is_none());
    }

    #[tokio::test]
    async fn test_stats_handler_lists_every_namespace() {
        let response = stats_handler(State(state())).await;
        assert!(response.enabled);
        assert_eq!(response.namespaces.len(), default_namespace_configs().len());
    }

    #[tokio::test]
    async fn test_warm_up_handler() {
        let response = warm_up_handler(State(state()), Path("dict".to_string()))
            .await
            .unwrap();
        assert_eq!(response.report.total, 1);
        assert!(response.report.is_complete());
    }

    #[tokio::test]
    async fn test_unknown_domain() {
        let result = evict_domain_handler(State(state()), Path("users".to_string())).await;
        assert!(matches!(result, Err(CacheError::UnknownDomain(_))));
    }

    #[tokio::test]
    async fn test_refresh_dict_handler() {
        let state = state();
        let response = refresh_dict_handler(State(state.clone()), Path("sex".to_string()))
            .await
            .unwrap();
        assert!(response.found);

        let response = refresh_dict_handler(State(state), Path("gone".to_string()))
            .await
            .unwrap();
        assert!(!response.found);
    }
}
