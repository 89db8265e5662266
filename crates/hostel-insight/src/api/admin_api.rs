//! Administrative endpoints: knowledge reindex, store statistics and the
//! configuration the presentation layer reads at load time.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::ApiError;
use crate::memory_db::DatabaseStats;
use crate::metrics;
use crate::shared_state::SharedState;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub memory: DatabaseStats,
    pub kb_passages: i64,
    pub total_requests: usize,
    pub chat_turns: usize,
    pub reindex_runs: usize,
    pub reindex_running: bool,
}

#[derive(Debug, Serialize)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub debug_enabled: bool,
}

/// Kicks off a background reindex and answers immediately with 202.
pub async fn reindex(State(state): State<Arc<SharedState>>) -> impl IntoResponse {
    let status = if state.spawn_reindex().is_some() {
        "started"
    } else {
        "already_running"
    };
    metrics::inc_request("reindex", "202");
    (StatusCode::ACCEPTED, Json(json!({ "status": status })))
}

pub async fn stats(State(state): State<Arc<SharedState>>) -> Result<Json<StatsResponse>, ApiError> {
    let memory_db = state.memory_db.clone();
    let knowledge = state.knowledge.clone();
    let (memory, kb_passages) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        Ok((memory_db.get_stats()?, knowledge.passage_count()?))
    })
    .await
    .map_err(|e| ApiError::internal(format!("stats task failed: {}", e)))?
    .map_err(|e| ApiError::internal(format!("failed to read stats: {}", e)))?;

    metrics::inc_request("stats", "200");
    Ok(Json(StatsResponse {
        memory,
        kb_passages,
        total_requests: state.counters.total_requests.load(Ordering::Relaxed),
        chat_turns: state.counters.chat_turns.load(Ordering::Relaxed),
        reindex_runs: state.counters.reindex_runs.load(Ordering::Relaxed),
        reindex_running: state.reindex_running(),
    }))
}

pub async fn client_config(State(state): State<Arc<SharedState>>) -> Json<ClientConfig> {
    Json(ClientConfig {
        api_base_url: state.config.public_api_url.clone(),
        debug_enabled: state.config.debug_enabled,
    })
}
