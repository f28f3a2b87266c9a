//! OCR service client

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use thiserror::Error;

use crate::input::MediaUpload;

#[derive(Debug, Clone, Error)]
pub enum OcrError {
    /// The service failed or returned an unusable response
    #[error("ocr request error: {0}")]
    Request(String),
}

/// Seam between the input normalizer and the OCR service
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Detect text regions in an uploaded image, in reading order
    async fn read_text(&self, image: &MediaUpload) -> Result<Vec<OcrFragment>, OcrError>;
}

/// One detected text region
#[derive(Debug, Clone, Deserialize)]
pub struct OcrFragment {
    /// Corner points of the detected region
    #[serde(rename = "box")]
    #[allow(dead_code)]
    pub bounding_box: Vec<[f32; 2]>,
    pub text: String,
    pub confidence: f32,
}

/// Client for an EasyOCR-style reader sidecar
#[derive(Clone)]
pub struct OcrClient {
    client: reqwest::Client,
    base_url: String,
    languages: Vec<String>,
}

impl OcrClient {
    pub fn new(base_url: &str, languages: &[String]) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            languages: languages.to_vec(),
        }
    }
}

#[async_trait]
impl OcrEngine for OcrClient {
    async fn read_text(&self, image: &MediaUpload) -> Result<Vec<OcrFragment>, OcrError> {
        let url = format!("{}/readtext", self.base_url);

        let part = multipart::Part::bytes(image.bytes.clone())
            .file_name(image.filename.clone());
        let form = multipart::Form::new()
            .part("file", part)
            .text("languages", self.languages.join(","));

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| OcrError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OcrError::Request(format!(
                "ocr server returned status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| OcrError::Request(e.to_string()))
    }
}

/// Join detected fragments with single spaces into one prompt string.
///
/// Zero fragments and fragments containing only blank text both yield no
/// usable input.
pub fn join_fragments(fragments: &[OcrFragment]) -> Option<String> {
    let joined = fragments
        .iter()
        .map(|fragment| fragment.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    if joined.trim().is_empty() {
        None
    } else {
        Some(joined)
    }
}
