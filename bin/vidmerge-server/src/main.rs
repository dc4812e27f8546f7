//! vidmerge-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON or pretty).
//! 3. Build the shared HTTP client, platform providers and merge engine.
//! 4. Start the task store sweeper.
//! 5. Build the Axum router and serve with graceful shutdown.

mod config;
mod error;
mod middleware;
mod routes;
mod schemas;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use vidmerge_core::{
    FetchPipeline, MergeEngine, Orchestrator, TaskStore, ThumbnailExtractor, spawn_sweeper,
};
use vidmerge_providers::{build_client, build_registry};

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Config::from_env();

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let env_filter = match cfg.log_level.parse::<tracing_subscriber::EnvFilter>() {
        Ok(f) => f,
        Err(e) => {
            eprintln!(
                "WARN: log filter '{}' is not valid ({}); falling back to 'info'",
                cfg.log_level, e
            );
            tracing_subscriber::EnvFilter::new("info")
        }
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);

    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "vidmerge-server starting");

    // ── 3. Search engine ───────────────────────────────────────────────────────
    let client = build_client(cfg.http_proxy.as_deref())?;
    let registry = build_registry(&cfg.providers_config(), client.clone());
    let pipeline = FetchPipeline::new(registry).with_fetch_timeout(cfg.fetch_timeout);
    let engine =
        MergeEngine::new(cfg.merge_config()).with_extractor(Arc::new(ThumbnailExtractor::new(client)));

    let store = TaskStore::new();
    let orchestrator = Orchestrator::new(
        store.clone(),
        pipeline,
        engine,
        cfg.orchestrator_config(),
    );
    info!(
        max_concurrent_tasks = cfg.max_concurrent_tasks,
        demo_mode = cfg.demo_mode,
        fetch_timeout = ?cfg.fetch_timeout,
        "search engine ready"
    );

    // ── 4. Expiry sweeper ──────────────────────────────────────────────────────
    let sweeper = spawn_sweeper(store, cfg.sweep_interval, cfg.task_retention);

    // ── 5. HTTP server with graceful shutdown ──────────────────────────────────
    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        orchestrator,
    });
    let app = routes::build(state);
    let addr: SocketAddr = cfg.bind_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("vidmerge-server stopped");
    Ok(())
}

/// Returns a future that resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
