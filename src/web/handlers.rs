use axum::Json;
use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::response::Html;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::input::{MediaUpload, TurnInput};
use crate::llm::ChatMessage;

use super::AppState;
use super::error::AppError;

/// The embedded single-page UI
pub async fn index() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

/// Response body for one chat turn. The transcript travels back to the page
/// and is echoed on the next submission; the server keeps nothing.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub history: Vec<ChatMessage>,
    pub session_id: String,
    pub ended: bool,
}

/// One chat turn: normalize the submitted modalities, run the turn, return
/// the reply plus the updated transcript.
pub async fn chat(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ChatResponse>, AppError> {
    let mut turn = TurnInput::default();
    let mut model = state.config.default_model.clone();
    let mut history: Vec<ChatMessage> = Vec::new();
    let mut session_id: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "text" => turn.text = Some(field.text().await.map_err(bad_request)?),
            "model" => {
                let value = field.text().await.map_err(bad_request)?;
                if !value.trim().is_empty() {
                    model = value.trim().to_string();
                }
            }
            "history" => {
                let raw = field.text().await.map_err(bad_request)?;
                if !raw.trim().is_empty() {
                    history = serde_json::from_str(&raw)
                        .map_err(|e| AppError::BadRequest(format!("bad history: {e}")))?;
                }
            }
            "session_id" => {
                let value = field.text().await.map_err(bad_request)?;
                if !value.trim().is_empty() {
                    session_id = Some(value);
                }
            }
            "audio" => turn.audio = read_upload(field).await?,
            "image" => turn.image = read_upload(field).await?,
            other => warn!(field = other, "ignoring unknown form field"),
        }
    }

    // A fresh transcript starts a fresh session
    let session_id = match (history.is_empty(), session_id) {
        (false, Some(id)) => id,
        _ => Uuid::new_v4().to_string(),
    };

    info!(session = %session_id, model = %model, "chat turn");

    let input = state.normalizer.normalize(&turn).await;
    let result = state.turns.run_turn(&model, input, history).await?;

    Ok(Json(ChatResponse {
        reply: result.reply,
        history: result.history,
        session_id,
        ended: result.ended,
    }))
}

/// Response body for the model selector
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
    pub default: String,
}

/// Model selector entries: configured suggestions merged with whatever is
/// installed on the Ollama host. An unreachable host degrades to the
/// suggestions alone.
pub async fn models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let installed = match state.ollama.list_models().await {
        Ok(models) => models,
        Err(e) => {
            warn!(error = %e, "could not list installed models");
            Vec::new()
        }
    };

    Json(ModelsResponse {
        models: merge_models(&state.config.model_suggestions, installed),
        default: state.config.default_model.clone(),
    })
}

/// Suggestions first, installed models appended, duplicates removed
pub fn merge_models(suggestions: &[String], installed: Vec<String>) -> Vec<String> {
    let mut merged: Vec<String> = suggestions.to_vec();
    for model in installed {
        if !merged.contains(&model) {
            merged.push(model);
        }
    }
    merged
}

/// Read an uploaded file part. An empty part (no file picked) counts as no
/// upload at all.
async fn read_upload(field: Field<'_>) -> Result<Option<MediaUpload>, AppError> {
    let filename = field.file_name().unwrap_or("upload").to_string();
    let bytes = field.bytes().await.map_err(bad_request)?;

    if bytes.is_empty() {
        return Ok(None);
    }

    Ok(Some(MediaUpload { filename, bytes: bytes.to_vec() }))
}

fn bad_request(e: impl std::fmt::Display) -> AppError {
    AppError::BadRequest(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(models: &[&str]) -> Vec<String> {
        models.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn merge_keeps_suggestions_first_and_dedupes() {
        let suggestions = names(&["deepseek-r1:1.5b", "deepseek-r1:8b"]);
        let installed = names(&["qwen3:4b", "deepseek-r1:8b", "llama3.2:3b"]);

        let merged = merge_models(&suggestions, installed);
        assert_eq!(
            merged,
            names(&["deepseek-r1:1.5b", "deepseek-r1:8b", "qwen3:4b", "llama3.2:3b"])
        );
    }

    #[test]
    fn merge_degrades_to_suggestions_alone() {
        let suggestions = names(&["deepseek-r1:1.5b"]);
        let merged = merge_models(&suggestions, Vec::new());
        assert_eq!(merged, suggestions);
    }
}
