use chrono::Utc;
use serde::{ Serialize, Deserialize };
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// One entry of the transcript. Ids are unique within a session and stable
/// for its lifetime; index order is chronological order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// Whether a turn originated from typed text or transcribed speech. Carried
/// on every completion job so the reply side never consults shared state to
/// decide on auto-playback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Voice,
}

/// Conversation mode selecting the system prompt template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChatMode {
    ThoughtPartner,
    Reflection,
    Insights,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::ThoughtPartner => "thought-partner",
            ChatMode::Reflection => "reflection",
            ChatMode::Insights => "insights",
        }
    }
}

impl Default for ChatMode {
    fn default() -> Self {
        ChatMode::ThoughtPartner
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseChatModeError {
    message: String,
}

impl fmt::Display for ParseChatModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseChatModeError {}

impl FromStr for ChatMode {
    type Err = ParseChatModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "thought-partner" | "thought_partner" | "general" => Ok(ChatMode::ThoughtPartner),
            "reflection" => Ok(ChatMode::Reflection),
            "insights" => Ok(ChatMode::Insights),
            _ =>
                Err(ParseChatModeError {
                    message: format!("Invalid chat mode: '{}'", s),
                }),
        }
    }
}

/// Role/content pair used by the voice-chat loop's transient buffer and by
/// completion requests. Lighter than `ChatMessage`: no id, no timestamp.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}
