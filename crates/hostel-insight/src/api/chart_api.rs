//! Chart inference for rows the client already holds.

use axum::Json;
use serde::{Deserialize, Serialize};

use crate::metrics;
use crate::query_engine::{infer_chart, ChartOverride, ChartSpec, Row};

#[derive(Debug, Deserialize)]
pub struct ChartRequest {
    #[serde(default)]
    pub rows: Vec<Row>,
    /// `pie`, `bar` or `auto`; anything else counts as `auto`.
    #[serde(default, rename = "override")]
    pub chart_override: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChartResponse {
    pub chart: Option<ChartSpec>,
}

pub async fn chart(Json(payload): Json<ChartRequest>) -> Json<ChartResponse> {
    let chart_override = payload.chart_override.as_deref().and_then(ChartOverride::parse);
    metrics::inc_request("chart", "200");
    Json(ChartResponse {
        chart: infer_chart(&payload.rows, chart_override),
    })
}
