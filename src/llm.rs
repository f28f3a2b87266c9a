use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted while streaming a chat reply
#[derive(Debug, Clone)]
pub enum LlmEvent {
    /// Reasoning/thinking fragment, echoed but never persisted
    ThinkingDelta(String),
    /// Answer fragment
    TextDelta(String),
    /// Stream finished
    StreamComplete,
    /// Error occurred mid-stream
    Error(String),
}

/// Role of a transcript record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One record of the conversation transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Seam between the turn handler and the model backend
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Start a streaming chat completion over the full transcript
    async fn stream_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        think: bool,
    ) -> Result<mpsc::Receiver<LlmEvent>>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    think: bool,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

/// Client for a local Ollama host
#[derive(Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// List the models installed on the Ollama host
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach Ollama")?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Failed to list models: {}",
                response.status()
            ));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .context("Failed to parse model list")?;

        Ok(tags.models.into_iter().map(|model| model.name).collect())
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn stream_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        think: bool,
    ) -> Result<mpsc::Receiver<LlmEvent>> {
        let url = format!("{}/api/chat", self.base_url);

        let payload = ChatRequest { model, messages, stream: true, think };

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .context("Failed to reach Ollama chat endpoint")?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Ollama request failed with status: {}. Make sure Ollama is running with: ollama serve",
                response.status()
            ));
        }

        let (tx, rx) = mpsc::channel(1000);

        tokio::spawn(async move {
            if let Err(e) = process_chat_stream(response, &tx).await {
                let _ = tx.send(LlmEvent::Error(e.to_string())).await;
            }
        });

        Ok(rx)
    }
}

/// Consume the NDJSON chat body, forwarding each fragment as an event
async fn process_chat_stream(
    response: reqwest::Response,
    tx: &mpsc::Sender<LlmEvent>,
) -> Result<()> {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Ollama stream interrupted")?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        // Process complete lines
        while let Some(newline_pos) = buffer.find('\n') {
            let line = buffer[..newline_pos].trim().to_string();
            buffer = buffer[newline_pos + 1..].to_string();

            if emit_fragment(&line, tx).await {
                let _ = tx.send(LlmEvent::StreamComplete).await;
                return Ok(());
            }
        }
    }

    // Flush a trailing line that arrived without a newline
    let line = buffer.trim().to_string();
    emit_fragment(&line, tx).await;
    let _ = tx.send(LlmEvent::StreamComplete).await;
    Ok(())
}

/// Send the deltas carried by one stream line. Returns true on the final line.
async fn emit_fragment(line: &str, tx: &mpsc::Sender<LlmEvent>) -> bool {
    let Some(fragment) = parse_chat_line(line) else {
        return false;
    };

    if let Some(thinking) = fragment.thinking {
        let _ = tx.send(LlmEvent::ThinkingDelta(thinking)).await;
    }
    if let Some(content) = fragment.content {
        let _ = tx.send(LlmEvent::TextDelta(content)).await;
    }

    fragment.done
}

/// A parsed line of the chat stream
#[derive(Debug, PartialEq)]
struct StreamFragment {
    thinking: Option<String>,
    content: Option<String>,
    done: bool,
}

/// Parse one NDJSON line. Empty and malformed lines are skipped; either
/// channel may be absent or empty on any given line.
fn parse_chat_line(line: &str) -> Option<StreamFragment> {
    if line.is_empty() {
        return None;
    }

    let chunk: ChatChunk = serde_json::from_str(line).ok()?;
    let (thinking, content) = match chunk.message {
        Some(message) => (
            message.thinking.filter(|t| !t.is_empty()),
            message.content.filter(|c| !c.is_empty()),
        ),
        None => (None, None),
    };

    Some(StreamFragment { thinking, content, done: chunk.done })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_fragment() {
        let line = r#"{"model":"deepseek-r1:1.5b","message":{"role":"assistant","content":"Hel"},"done":false}"#;
        let fragment = parse_chat_line(line).unwrap();
        assert_eq!(fragment.content.as_deref(), Some("Hel"));
        assert_eq!(fragment.thinking, None);
        assert!(!fragment.done);
    }

    #[test]
    fn parses_thinking_fragment() {
        let line = r#"{"message":{"role":"assistant","thinking":"Let me see","content":""},"done":false}"#;
        let fragment = parse_chat_line(line).unwrap();
        assert_eq!(fragment.thinking.as_deref(), Some("Let me see"));
        assert_eq!(fragment.content, None);
    }

    #[test]
    fn parses_final_line() {
        let line = r#"{"message":{"role":"assistant","content":""},"done":true,"total_duration":12345}"#;
        let fragment = parse_chat_line(line).unwrap();
        assert!(fragment.done);
        assert_eq!(fragment.content, None);
    }

    #[test]
    fn skips_empty_and_malformed_lines() {
        assert_eq!(parse_chat_line(""), None);
        assert_eq!(parse_chat_line("not json"), None);
    }

    #[test]
    fn roles_serialize_lowercase() {
        let message = ChatMessage::user("hi");
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);

        let back: ChatMessage =
            serde_json::from_str(r#"{"role":"assistant","content":"yo"}"#).unwrap();
        assert_eq!(back.role, Role::Assistant);
    }
}
