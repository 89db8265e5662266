//! Chat endpoint: one orchestrated turn with session memory.

use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use super::ApiError;
use crate::metrics;
use crate::query_engine::{Request, ResponseEnvelope};
use crate::shared_state::SharedState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub debug: bool,
    /// Opaque client token. It is not authenticated; it only selects memory.
    #[serde(default)]
    pub session_id: Option<String>,
}

pub async fn chat(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ResponseEnvelope>, ApiError> {
    state.counters.inc_total_requests();
    if payload.message.trim().is_empty() {
        return Err(ApiError::bad_request("message required"));
    }
    state.counters.inc_chat_turns();

    let request = Request::new(payload.message, payload.session_id.unwrap_or_default()).with_debug(payload.debug);
    let envelope = state.orchestrator.handle(&request).await;
    info!(
        "Chat turn answered via {} path{}",
        envelope.path(),
        if envelope.error().is_some() { " with error" } else { "" }
    );
    metrics::inc_request("chat", "200");
    Ok(Json(envelope))
}
