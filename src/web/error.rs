use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the HTTP layer. Input-side conditions never land
/// here; they become the apology reply instead.
#[derive(Debug, Error)]
pub enum AppError {
    /// The request body could not be used
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// The model backend failed
    #[error("model backend error: {0}")]
    Upstream(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };

        tracing::error!(error = %self, "request failed");

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
