use async_trait::async_trait;
use futures::StreamExt;
use log::{ info, warn };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ parse_stream_line, ChatClient, CompletionRequest, CompletionResponse, StreamEvent, TokenStream };
use crate::llm::LlmConfig;
use crate::models::chat::Role;

pub struct GroqChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

#[derive(Serialize, Deserialize)]
struct GroqMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct GroqRequest {
    messages: Vec<GroqMessage>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct GroqResponse {
    choices: Vec<GroqChoice>,
}

#[derive(Deserialize)]
struct GroqChoice {
    message: GroqMessage,
}

impl GroqChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let chat_model = model.unwrap_or_else(|| "llama3-70b-8192".to_string());
        let api_url = base_url.unwrap_or_else(||
            "https://api.groq.com/openai/v1/chat/completions".to_string()
        );

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e|
                format!("Invalid API key format: {}", e)
            )?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            model: chat_model,
            base_url: api_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key.clone().ok_or_else(|| "Groq API key is required".to_string())?;

        Self::new(api_key, config.completion_model.clone(), config.base_url.clone())
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> GroqRequest {
        GroqRequest {
            messages: wire_messages(request),
            model: self.model.clone(),
            temperature: 0.7,
            max_tokens: 1024,
            stream: if stream {
                Some(true)
            } else {
                None
            },
        }
    }
}

/// System prompt first, then the transcript in order.
fn wire_messages(request: &CompletionRequest) -> Vec<GroqMessage> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if !request.system.is_empty() {
        messages.push(GroqMessage {
            role: Role::System.as_str().to_string(),
            content: request.system.clone(),
        });
    }
    for turn in &request.messages {
        messages.push(GroqMessage {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        });
    }
    messages
}

#[async_trait]
impl ChatClient for GroqChatClient {
    async fn complete(
        &self,
        request: &CompletionRequest
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let url = self.base_url.trim_end_matches('/').to_string();
        let req = self.build_request(request, false);

        let resp = self.http
            .post(&url)
            .json(&req)
            .send().await?
            .error_for_status()?
            .json::<GroqResponse>().await?;

        let content = resp.choices
            .first()
            .ok_or_else(|| "No response from Groq API".to_string())?
            .message.content.clone();

        Ok(CompletionResponse { response: content })
    }

    async fn stream_completion(
        &self,
        request: &CompletionRequest
    ) -> Result<TokenStream, Box<dyn StdError + Send + Sync>> {
        let url = self.base_url.trim_end_matches('/').to_string();
        let req = self.build_request(request, true);

        let (tx, rx) = mpsc::channel(32);
        let client = self.http.clone();

        info!("Starting Groq stream request to {}", url);

        tokio::spawn(async move {
            match client.post(&url).json(&req).send().await {
                Ok(resp) => {
                    if let Err(e) = resp.error_for_status_ref() {
                        let err_msg = format!("Groq API error: {}", e);
                        let _ = tx.send(
                            Err(
                                Box::new(
                                    std::io::Error::new(std::io::ErrorKind::Other, err_msg)
                                ) as _
                            )
                        ).await;
                        return;
                    }

                    let mut stream = resp.bytes_stream();

                    while let Some(chunk_result) = stream.next().await {
                        match chunk_result {
                            Ok(chunk) => {
                                if let Ok(text) = String::from_utf8(chunk.to_vec()) {
                                    for line in text.lines() {
                                        match parse_stream_line(line) {
                                            StreamEvent::Token(content) => {
                                                if tx.send(Ok(content)).await.is_err() {
                                                    return;
                                                }
                                            }
                                            StreamEvent::Done => {
                                                return;
                                            }
                                            StreamEvent::Skip => {}
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                let _ = tx.send(Err(Box::new(e) as _)).await;
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Groq request error: {}", e);
                    let _ = tx.send(Err(Box::new(e) as _)).await;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ ChatTurn, Modality };

    #[test]
    fn wire_messages_lead_with_system_prompt() {
        let request = CompletionRequest::new(
            "be helpful",
            vec![ChatTurn::new(Role::User, "Hello"), ChatTurn::new(Role::Assistant, "Hi")],
            Modality::Text
        );

        let wire = wire_messages(&request);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[0].role, "system");
        assert_eq!(wire[0].content, "be helpful");
        assert_eq!(wire[1].role, "user");
        assert_eq!(wire[2].role, "assistant");
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let request = CompletionRequest::new(
            "",
            vec![ChatTurn::new(Role::User, "Hello")],
            Modality::Voice
        );

        let wire = wire_messages(&request);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, "user");
    }

    #[test]
    fn defaults_match_hosted_endpoint() {
        let client = GroqChatClient::new("key".to_string(), None, None).unwrap();
        assert_eq!(client.get_model(), "llama3-70b-8192");
        assert_eq!(client.base_url, "https://api.groq.com/openai/v1/chat/completions");
    }
}
