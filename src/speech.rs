//! Speech-to-text service client

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use thiserror::Error;

use crate::input::MediaUpload;

/// Conditions the speech service can signal. Callers treat both as
/// "no usable input" but log them differently.
#[derive(Debug, Clone, Error)]
pub enum SpeechError {
    /// The recognizer produced no usable transcript
    #[error("could not understand audio")]
    Unintelligible,
    /// The service itself failed
    #[error("speech recognition error: {0}")]
    Request(String),
}

/// Seam between the input normalizer and the speech service
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe an uploaded audio clip
    async fn transcribe(&self, audio: &MediaUpload) -> Result<String, SpeechError>;
}

#[derive(Deserialize)]
struct InferenceResponse {
    text: String,
}

/// Client for a whisper.cpp-style transcription server
#[derive(Clone)]
pub struct SpeechClient {
    client: reqwest::Client,
    base_url: String,
}

impl SpeechClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SpeechToText for SpeechClient {
    async fn transcribe(&self, audio: &MediaUpload) -> Result<String, SpeechError> {
        let url = format!("{}/inference", self.base_url);

        let part = multipart::Part::bytes(audio.bytes.clone())
            .file_name(audio.filename.clone());
        let form = multipart::Form::new()
            .part("file", part)
            .text("response_format", "json");

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SpeechError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SpeechError::Request(format!(
                "transcription server returned status {}",
                response.status()
            )));
        }

        let parsed: InferenceResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::Request(e.to_string()))?;

        transcript_or_unintelligible(&parsed.text)
    }
}

/// A blank transcript means the recognizer heard nothing usable, which is a
/// different condition than the service failing outright.
fn transcript_or_unintelligible(raw: &str) -> Result<String, SpeechError> {
    let transcript = raw.trim();
    if transcript.is_empty() {
        Err(SpeechError::Unintelligible)
    } else {
        Ok(transcript.to_string())
    }
}
