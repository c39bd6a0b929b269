//! refcache - two-tier read-through cache for reference data
//!
//! Serves the administrative cache API over an in-memory backing store.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use refcache::cache::{L2Store, RedisL2};
use refcache::source::InMemorySource;
use refcache::{
    create_router, spawn_cleanup_task, spawn_refresh_task, spawn_warmup_task, AppState, Config,
    DomainCaches, TwoTierCache,
};

/// Bound on draining queued L2 writes at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Connect the shared tier, if configured
/// 4. Build the engine and the domain managers
/// 5. Start the expiry sweep, warm-up and refresh tasks
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "refcache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting refcache");

    let config = Config::from_env().inspect_err(|e| error!(error = %e, "invalid configuration"))?;
    info!(
        "Configuration loaded: enabled={}, port={}, shared_tier={}, cleanup_interval={}s",
        config.cache_enabled,
        config.server_port,
        config.redis_url.is_some(),
        config.cleanup_interval
    );

    let l2 = connect_shared_tier(&config).await;
    let engine = Arc::new(TwoTierCache::new(
        config.registry()?,
        l2,
        config.engine_options(),
    ));

    let source = match &config.seed_file {
        Some(path) => InMemorySource::from_file(path).await?,
        None => {
            warn!("SEED_FILE not set, starting with an empty backing store");
            InMemorySource::default()
        }
    };
    let caches = DomainCaches::new(Arc::clone(&engine), Arc::new(source));
    let scheduler = config.warmup_scheduler();

    if config.warmup_on_start {
        let reports = caches.warm_up_all(&scheduler).await?;
        let incomplete = reports.iter().filter(|r| !r.is_complete()).count();
        info!(domains = reports.len(), incomplete, "startup warm-up finished");
    }

    let mut background = vec![spawn_cleanup_task(
        Arc::clone(&engine),
        config.cleanup_interval,
    )];
    background.extend(spawn_warmup_task(
        caches.clone(),
        scheduler.clone(),
        config.warmup_interval,
    ));
    background.extend(spawn_refresh_task(
        caches.clone(),
        config.refresh_interval,
        Duration::from_secs(config.refresh_window),
    ));
    info!(tasks = background.len(), "Background tasks started");

    let app = create_router(AppState::new(caches, scheduler));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(background))
        .await
        .context("server error")?;

    engine.shutdown(SHUTDOWN_GRACE).await;
    info!("Server shutdown complete");
    Ok(())
}

/// Connects Redis when `REDIS_URL` is set. An unreachable Redis is not
/// fatal: the service runs L1-only.
async fn connect_shared_tier(config: &Config) -> Option<Arc<dyn L2Store>> {
    let url = config.redis_url.as_deref()?;
    match RedisL2::connect(
        url,
        config.redis_pool_size,
        Duration::from_millis(config.redis_timeout_ms),
    )
    .await
    {
        Ok(redis) => {
            let store: Arc<dyn L2Store> = Arc::new(redis);
            Some(store)
        }
        Err(e) => {
            warn!(error = %e, "Redis unreachable, running with L1 only");
            None
        }
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then aborts the
/// background tasks.
async fn shutdown_signal(background: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    for handle in background {
        handle.abort();
    }
    warn!("Background tasks aborted");
}
