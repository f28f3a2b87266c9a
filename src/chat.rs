//! Conversation turn handling and reply stream consumption

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::llm::{ChatMessage, ChatModel, LlmEvent};

/// Fixed reply when no modality produced usable input
pub const APOLOGY: &str = "Didn't understand input.";

/// Fixed reply when the user ends the session
pub const FAREWELL: &str = "Exiting chat.";

/// Keywords that end the session, compared case-insensitively
const EXIT_KEYWORDS: [&str; 2] = ["exit", "quit"];

/// Outcome of one conversation turn
#[derive(Debug)]
pub struct TurnResult {
    pub reply: String,
    pub history: Vec<ChatMessage>,
    pub ended: bool,
}

/// Decides exit vs. continue for one turn and maintains the transcript
pub struct TurnHandler {
    model: Arc<dyn ChatModel>,
    system_prompt: String,
}

impl TurnHandler {
    pub fn new(model: Arc<dyn ChatModel>, system_prompt: impl Into<String>) -> Self {
        Self { model, system_prompt: system_prompt.into() }
    }

    /// Run one conversation turn against the given model.
    ///
    /// No usable input returns the apology without touching the transcript.
    /// An exit keyword returns the farewell and resets the transcript. Any
    /// other input appends exactly one user record and one assistant record.
    pub async fn run_turn(
        &self,
        model_name: &str,
        input: Option<String>,
        mut history: Vec<ChatMessage>,
    ) -> Result<TurnResult> {
        let Some(user_input) = input else {
            return Ok(TurnResult { reply: APOLOGY.to_string(), history, ended: false });
        };

        if is_exit_keyword(&user_input) {
            info!("session ended by exit keyword");
            return Ok(TurnResult {
                reply: FAREWELL.to_string(),
                history: Vec::new(),
                ended: true,
            });
        }

        // Seed a fresh transcript with the system prompt
        if history.is_empty() {
            history.push(ChatMessage::system(self.system_prompt.clone()));
        }

        history.push(ChatMessage::user(user_input));

        let events = self.model.stream_chat(model_name, &history, false).await?;
        let reply = collect_reply(events).await?;

        history.push(ChatMessage::assistant(reply.clone()));

        Ok(TurnResult { reply, history, ended: false })
    }
}

fn is_exit_keyword(input: &str) -> bool {
    let lowered = input.trim().to_lowercase();
    EXIT_KEYWORDS.iter().any(|keyword| lowered == *keyword)
}

/// Drain the model's event stream, echoing both channels to the console as
/// they arrive. Thinking fragments are observability only; the returned
/// reply holds just the answer channel.
pub async fn collect_reply(mut events: mpsc::Receiver<LlmEvent>) -> Result<String> {
    let mut thinking = String::new();
    let mut reply = String::new();

    while let Some(event) = events.recv().await {
        match event {
            LlmEvent::ThinkingDelta(delta) => {
                print!("{delta}");
                let _ = io::stdout().flush();
                thinking.push_str(&delta);
            }
            LlmEvent::TextDelta(delta) => {
                print!("{delta}");
                let _ = io::stdout().flush();
                reply.push_str(&delta);
            }
            LlmEvent::StreamComplete => break,
            LlmEvent::Error(message) => {
                return Err(anyhow::anyhow!("model stream failed: {message}"));
            }
        }
    }
    println!();

    if !thinking.is_empty() {
        debug!(chars = thinking.len(), "dropped thinking channel");
    }

    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::llm::Role;

    /// Model stub that replays a fixed event script and records what it was
    /// asked to complete.
    struct ScriptedModel {
        events: Vec<LlmEvent>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        fn new(events: Vec<LlmEvent>) -> Self {
            Self { events, seen: Mutex::new(Vec::new()) }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn stream_chat(
            &self,
            _model: &str,
            messages: &[ChatMessage],
            _think: bool,
        ) -> Result<mpsc::Receiver<LlmEvent>> {
            self.seen.lock().unwrap().push(messages.to_vec());

            let (tx, rx) = mpsc::channel(64);
            for event in self.events.clone() {
                tx.send(event).await.unwrap();
            }
            Ok(rx)
        }
    }

    fn handler(model: Arc<ScriptedModel>) -> TurnHandler {
        TurnHandler::new(model, "You are a quiz expert.")
    }

    #[tokio::test]
    async fn no_input_returns_apology_without_touching_history() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let handler = handler(model.clone());

        let history = vec![
            ChatMessage::system("You are a quiz expert."),
            ChatMessage::user("earlier question"),
        ];
        let result = handler
            .run_turn("deepseek-r1:1.5b", None, history.clone())
            .await
            .unwrap();

        assert_eq!(result.reply, APOLOGY);
        assert_eq!(result.history, history);
        assert!(!result.ended);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn exit_keyword_resets_history() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let handler = handler(model.clone());

        for keyword in ["exit", "EXIT", "quit", " Quit "] {
            let history = vec![ChatMessage::system("prompt")];
            let result = handler
                .run_turn("deepseek-r1:1.5b", Some(keyword.to_string()), history)
                .await
                .unwrap();

            assert_eq!(result.reply, FAREWELL);
            assert!(result.history.is_empty());
            assert!(result.ended);
        }
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn streamed_fragments_accumulate_into_one_turn() {
        let model = Arc::new(ScriptedModel::new(vec![
            LlmEvent::TextDelta("Hel".to_string()),
            LlmEvent::TextDelta("lo".to_string()),
            LlmEvent::StreamComplete,
        ]));
        let handler = handler(model.clone());

        let result = handler
            .run_turn("deepseek-r1:1.5b", Some("say hello".to_string()), Vec::new())
            .await
            .unwrap();

        assert_eq!(result.reply, "Hello");
        assert!(!result.ended);

        // Fresh transcript: system prompt, then exactly one user and one
        // assistant record for the turn.
        assert_eq!(result.history.len(), 3);
        assert_eq!(result.history[0].role, Role::System);
        assert_eq!(result.history[1], ChatMessage::user("say hello"));
        assert_eq!(result.history[2], ChatMessage::assistant("Hello"));
    }

    #[tokio::test]
    async fn model_sees_full_transcript_including_new_user_record() {
        let model = Arc::new(ScriptedModel::new(vec![
            LlmEvent::TextDelta("B".to_string()),
            LlmEvent::StreamComplete,
        ]));
        let handler = handler(model.clone());

        let prior = vec![
            ChatMessage::system("You are a quiz expert."),
            ChatMessage::user("first question"),
            ChatMessage::assistant("A"),
        ];
        let result = handler
            .run_turn("deepseek-r1:8b", Some("second question".to_string()), prior)
            .await
            .unwrap();

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].len(), 4);
        assert_eq!(seen[0][3], ChatMessage::user("second question"));

        assert_eq!(result.history.len(), 5);
        assert_eq!(result.history[4], ChatMessage::assistant("B"));
    }

    #[tokio::test]
    async fn thinking_channel_is_not_persisted() {
        let model = Arc::new(ScriptedModel::new(vec![
            LlmEvent::ThinkingDelta("the answer is obviously ".to_string()),
            LlmEvent::TextDelta("42".to_string()),
            LlmEvent::StreamComplete,
        ]));
        let handler = handler(model);

        let result = handler
            .run_turn("deepseek-r1:1.5b", Some("what is it?".to_string()), Vec::new())
            .await
            .unwrap();

        assert_eq!(result.reply, "42");
        assert_eq!(result.history[2], ChatMessage::assistant("42"));
    }

    #[tokio::test]
    async fn stream_error_propagates() {
        let model = Arc::new(ScriptedModel::new(vec![
            LlmEvent::TextDelta("partial".to_string()),
            LlmEvent::Error("connection reset".to_string()),
        ]));
        let handler = handler(model);

        let result = handler
            .run_turn("deepseek-r1:1.5b", Some("hello".to_string()), Vec::new())
            .await;

        assert!(result.is_err());
    }

    #[test]
    fn exit_keywords_match_case_insensitively() {
        assert!(is_exit_keyword("exit"));
        assert!(is_exit_keyword("EXIT"));
        assert!(is_exit_keyword("Quit"));
        assert!(!is_exit_keyword("exit now"));
        assert!(!is_exit_keyword("quite"));
    }
}
