pub mod groq;
pub mod openai;

use async_trait::async_trait;
use futures::{ Stream, Future };
use serde::Deserialize;
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use super::{ LlmConfig, LlmType };
use self::groq::GroqChatClient;
use self::openai::OpenAIChatClient;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::models::chat::{ ChatTurn, Modality };

pub type TokenStream = Pin<
    Box<dyn Stream<Item = Result<String, Box<dyn StdError + Send + Sync>>> + Send>
>;

/// One completion call: the full ordered transcript, the mode's system
/// prompt, and the modality that produced the newest user turn. The modality
/// rides along so the response side can decide on auto speech playback
/// without consulting shared state.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ChatTurn>,
    pub modality: Modality,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, messages: Vec<ChatTurn>, modality: Modality) -> Self {
        Self {
            system: system.into(),
            messages,
            modality,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Single-shot completion, used by the voice-chat loop.
    async fn complete(
        &self,
        request: &CompletionRequest
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>>;

    /// Token-by-token completion, used by the interactive transcript.
    async fn stream_completion(
        &self,
        request: &CompletionRequest
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>>;

    fn get_model(&self) -> String;
}

pub fn create_streaming_response<F, Fut>(
    response_fn: F
) -> Result<TokenStream, Box<dyn StdError + Send + Sync>>
    where
        F: FnOnce(mpsc::Sender<Result<String, Box<dyn StdError + Send + Sync>>>) -> Fut +
            Send +
            'static,
        Fut: Future<Output = ()> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Ok(Box::pin(ReceiverStream::new(rx)))
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Groq => {
            let specific_client = GroqChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

/// One parsed server-sent-events line of an OpenAI-style chat stream.
#[derive(Debug, PartialEq)]
pub(crate) enum StreamEvent {
    Token(String),
    Done,
    Skip,
}

#[derive(Deserialize)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(rename = "finish_reason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// Both retained providers speak the same SSE dialect: `data: {json}` lines,
/// terminated by `data: [DONE]` or a `finish_reason` of `stop`.
pub(crate) fn parse_stream_line(line: &str) -> StreamEvent {
    if line.is_empty() {
        return StreamEvent::Skip;
    }
    if line == "data: [DONE]" {
        return StreamEvent::Done;
    }

    let Some(data) = line.strip_prefix("data: ") else {
        return StreamEvent::Skip;
    };

    match serde_json::from_str::<StreamResponse>(data) {
        Ok(stream_resp) => {
            for choice in stream_resp.choices {
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        return StreamEvent::Token(content);
                    }
                }
                if let Some(reason) = &choice.finish_reason {
                    if reason == "stop" {
                        return StreamEvent::Done;
                    }
                }
            }
            StreamEvent::Skip
        }
        Err(_) => StreamEvent::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    #[test]
    fn parses_token_lines() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#;
        assert_eq!(parse_stream_line(line), StreamEvent::Token("Hi".to_string()));
    }

    #[test]
    fn parses_done_marker_and_stop_reason() {
        assert_eq!(parse_stream_line("data: [DONE]"), StreamEvent::Done);
        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_stream_line(line), StreamEvent::Done);
    }

    #[test]
    fn skips_noise_lines() {
        assert_eq!(parse_stream_line(""), StreamEvent::Skip);
        assert_eq!(parse_stream_line(": keepalive"), StreamEvent::Skip);
        assert_eq!(parse_stream_line("data: not-json"), StreamEvent::Skip);
    }

    #[test]
    fn request_snapshot_keeps_order() {
        let request = CompletionRequest::new(
            "system",
            vec![
                ChatTurn::new(Role::User, "first"),
                ChatTurn::new(Role::Assistant, "second")
            ],
            Modality::Text
        );
        assert_eq!(request.messages[0].content, "first");
        assert_eq!(request.messages[1].role, Role::Assistant);
        assert_eq!(request.modality, Modality::Text);
    }
}
