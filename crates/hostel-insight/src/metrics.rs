// hostel-insight/crates/hostel-insight/src/metrics.rs

use axum::http::StatusCode;
use axum::response::IntoResponse;
use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Registry, TextEncoder};
use std::sync::OnceLock;
use tracing::warn;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}

static REQ_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
static PIPELINE_OUTCOMES: OnceLock<IntCounterVec> = OnceLock::new();
static LLM_DURATION: OnceLock<Histogram> = OnceLock::new();

pub fn init_metrics() {
    if REQ_COUNTER.get().is_some() {
        return;
    }

    match IntCounterVec::new(
        prometheus::opts!("requests_total", "Total requests per route"),
        &["route", "status"],
    ) {
        Ok(counter) => {
            REGISTRY.register(Box::new(counter.clone())).ok();
            let _ = REQ_COUNTER.set(counter);
        }
        Err(e) => warn!("Failed to create requests_total: {}", e),
    }

    match IntCounterVec::new(
        prometheus::opts!(
            "pipeline_outcomes_total",
            "Orchestrator outcomes by path (bi, informational, memory) and result"
        ),
        &["path", "outcome"],
    ) {
        Ok(counter) => {
            REGISTRY.register(Box::new(counter.clone())).ok();
            let _ = PIPELINE_OUTCOMES.set(counter);
        }
        Err(e) => warn!("Failed to create pipeline_outcomes_total: {}", e),
    }

    let opts = HistogramOpts::new(
        "llm_request_duration_seconds",
        "Latency of language model completion calls",
    )
    .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]);
    match Histogram::with_opts(opts) {
        Ok(histogram) => {
            REGISTRY.register(Box::new(histogram.clone())).ok();
            let _ = LLM_DURATION.set(histogram);
        }
        Err(e) => warn!("Failed to create llm_request_duration_seconds: {}", e),
    }
}

pub fn inc_request(route: &str, status: &str) {
    if let Some(counter) = REQ_COUNTER.get() {
        counter.with_label_values(&[route, status]).inc();
    }
}

pub fn inc_outcome(path: &str, outcome: &str) {
    if let Some(counter) = PIPELINE_OUTCOMES.get() {
        counter.with_label_values(&[path, outcome]).inc();
    }
}

pub fn observe_llm_duration(seconds: f64) {
    if let Some(histogram) = LLM_DURATION.get() {
        histogram.observe(seconds);
    }
}

pub async fn get_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; version=0.0.4")],
            format!("failed to encode metrics: {}", e).into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
}
