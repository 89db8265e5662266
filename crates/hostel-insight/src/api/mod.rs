//! HTTP handlers. Every handler takes `State<Arc<SharedState>>`.
//!
//! Handlers only return non-200 for malformed requests. Pipeline failures are
//! reported inside the 200 response body.

pub mod admin_api;
pub mod chart_api;
pub mod chat_api;
pub mod query_api;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub use admin_api::{client_config, reindex, stats};
pub use chart_api::chart;
pub use chat_api::chat;
pub use query_api::query;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        crate::metrics::inc_request("error", self.status.as_str());
        (
            self.status,
            Json(json!({
                "error": self.message,
                "code": self.status.as_u16(),
            })),
        )
            .into_response()
    }
}
