//! UI binding layer: a single page plus the JSON/multipart API behind it

pub mod error;
pub mod handlers;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::chat::TurnHandler;
use crate::config::Config;
use crate::input::InputNormalizer;
use crate::llm::OllamaClient;

/// Uploads larger than this are rejected outright
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Shared handles for request handlers. Built once at startup; holds no
/// per-session state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ollama: Arc<OllamaClient>,
    pub normalizer: Arc<InputNormalizer>,
    pub turns: Arc<TurnHandler>,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/api/chat", post(handlers::chat))
        .route("/api/models", get(handlers::models))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(%addr, "web UI listening");

    axum::serve(listener, router(state))
        .await
        .context("Server error")?;

    Ok(())
}
