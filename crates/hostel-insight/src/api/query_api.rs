//! Plain NL to SQL endpoint: no memory, no chat history.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::ApiError;
use crate::metrics;
use crate::query_engine::Row;
use crate::shared_state::SharedState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub prompt: String,
    pub llm_raw: String,
    pub sql: Option<String>,
    pub safety_ok: bool,
    pub data: Vec<Row>,
    pub error: Option<String>,
}

pub async fn query(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    state.counters.inc_total_requests();
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(ApiError::bad_request("question required"));
    }
    info!("Query request: '{}'", question);

    let bi = state.orchestrator.run_bi_query(question).await;
    metrics::inc_request("query", "200");
    Ok(Json(QueryResponse {
        prompt: bi.prompt,
        llm_raw: bi.llm_raw,
        sql: bi.sql,
        safety_ok: bi.safety_ok,
        data: bi.data,
        error: bi.error,
    }))
}
