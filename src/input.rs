//! Input normalization: reduce one of three modalities to a text prompt

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::ocr::{OcrEngine, join_fragments};
use crate::speech::{SpeechError, SpeechToText};

/// An uploaded media payload (audio clip or image)
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Raw input for one conversation turn. At most one modality is expected to
/// be meaningful per call.
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    pub text: Option<String>,
    pub audio: Option<MediaUpload>,
    pub image: Option<MediaUpload>,
}

/// Reduces a turn's modalities to a single prompt string, or `None` when no
/// usable input was supplied.
pub struct InputNormalizer {
    speech: Arc<dyn SpeechToText>,
    ocr: Arc<dyn OcrEngine>,
}

impl InputNormalizer {
    pub fn new(speech: Arc<dyn SpeechToText>, ocr: Arc<dyn OcrEngine>) -> Self {
        Self { speech, ocr }
    }

    /// Normalize one turn's input. Audio wins over image, image over text;
    /// a supplied-but-failed higher modality does not fall through to the
    /// next one.
    pub async fn normalize(&self, turn: &TurnInput) -> Option<String> {
        if let Some(audio) = &turn.audio {
            return self.normalize_audio(audio).await;
        }

        if let Some(image) = &turn.image {
            return self.normalize_image(image).await;
        }

        normalize_text(turn.text.as_deref())
    }

    async fn normalize_audio(&self, audio: &MediaUpload) -> Option<String> {
        match self.speech.transcribe(audio).await {
            Ok(transcript) => {
                info!(chars = transcript.len(), "speech to text successful");
                Some(transcript)
            }
            Err(SpeechError::Unintelligible) => {
                warn!(file = %audio.filename, "could not understand audio");
                None
            }
            Err(SpeechError::Request(detail)) => {
                warn!(file = %audio.filename, %detail, "speech recognition error");
                None
            }
        }
    }

    async fn normalize_image(&self, image: &MediaUpload) -> Option<String> {
        match self.ocr.read_text(image).await {
            Ok(fragments) => {
                for fragment in &fragments {
                    debug!(text = %fragment.text, confidence = fragment.confidence, "ocr fragment");
                }
                let text = join_fragments(&fragments);
                if text.is_none() {
                    warn!(file = %image.filename, "no text found in image");
                }
                text
            }
            Err(e) => {
                warn!(file = %image.filename, error = %e, "ocr request failed");
                None
            }
        }
    }
}

/// Plain text passes through verbatim unless blank
fn normalize_text(text: Option<&str>) -> Option<String> {
    match text {
        Some(t) if !t.trim().is_empty() => Some(t.to_string()),
        _ => None,
    }
}
