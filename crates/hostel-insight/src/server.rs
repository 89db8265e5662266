//! HTTP server startup and routing.
//!
//! Every handler reads the same `Arc<SharedState>`; the model backend is the
//! only remote dependency.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{api, config::Config, metrics, shared_state::SharedState};

pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing();
    metrics::init_metrics();
    cfg.print_config();

    let addr = cfg.api_addr()?;
    let reindex_on_startup = cfg.reindex_on_startup;
    let state = Arc::new(SharedState::new(cfg)?);

    if reindex_on_startup {
        info!("Reindexing knowledge base in the background");
        state.spawn_reindex();
    }

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = build_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

pub fn build_router(state: Arc<SharedState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);
    let request_timeout = Duration::from_secs(state.config.request_timeout_seconds.max(1));

    Router::new()
        .route("/api/chat", post(api::chat))
        .route("/api/query", post(api::query))
        .route("/api/chart", post(api::chart))
        .route("/api/config", get(api::client_config))
        .route("/admin/reindex", post(api::reindex))
        .route("/admin/stats", get(api::stats))
        .route("/metrics", get(metrics::get_metrics))
        .route("/healthz", get(|| async { "OK" }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
