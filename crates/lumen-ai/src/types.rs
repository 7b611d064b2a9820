use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

const CONNECTIVITY_MESSAGE: &str =
    "Could not reach the chat server. Check that it is running and try again.";
const UNREADABLE_RESPONSE_MESSAGE: &str = "The chat server sent a response that could not be read.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `MessageRole` values.
pub enum MessageRole {
    #[default]
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Server-issued identifier of a stored message. The server uses the entry
/// timestamp as the key, and may send it as a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawMessageId {
            Text(String),
            Integer(i64),
            Float(f64),
        }

        Ok(match RawMessageId::deserialize(deserializer)? {
            RawMessageId::Text(text) => Self(text),
            RawMessageId::Integer(value) => Self(value.to_string()),
            RawMessageId::Float(value) => Self(value.to_string()),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
/// Body of `POST /chat/stream`.
pub struct ChatStreamRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
/// One persona as listed by the persona directory.
pub struct PersonaSummary {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PersonaListing {
    #[serde(default)]
    pub personas: Vec<PersonaSummary>,
    #[serde(default)]
    pub default: Option<String>,
}

impl PersonaListing {
    pub fn find(&self, persona_id: &str) -> Option<&PersonaSummary> {
        self.personas.iter().find(|persona| persona.id == persona_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
/// One stored conversation entry returned by `GET /memory/recent`.
pub struct MemoryEntry {
    #[serde(default)]
    pub timestamp: Option<MessageId>,
    #[serde(default)]
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub persona_name: Option<String>,
    #[serde(default)]
    pub image_context: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub generated_image_path: Option<String>,
    #[serde(default)]
    pub generated_image_prompt: Option<String>,
}

#[derive(Debug, Error)]
/// Enumerates supported `LumenAiError` values.
pub enum LumenAiError {
    #[error("invalid backend configuration: {0}")]
    InvalidConfig(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned non-success status {status}: {message}")]
    HttpStatus { status: u16, message: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl LumenAiError {
    /// Text suitable for showing to the person using the client.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidConfig(detail) => detail.clone(),
            Self::Http(_) => CONNECTIVITY_MESSAGE.to_string(),
            Self::HttpStatus { message, .. } => message.clone(),
            Self::Serde(_) | Self::InvalidResponse(_) => UNREADABLE_RESPONSE_MESSAGE.to_string(),
        }
    }
}

pub type ByteStream = BoxStream<'static, Result<Vec<u8>, LumenAiError>>;

#[async_trait]
/// Opens the streaming response for one submitted message.
pub trait ChatTransport: Send + Sync {
    async fn open_stream(&self, request: &ChatStreamRequest) -> Result<ByteStream, LumenAiError>;
}

#[async_trait]
/// Server-side conversation memory, keyed by message timestamp.
pub trait MemoryStore: Send + Sync {
    async fn recent(&self, persona_id: Option<&str>) -> Result<Vec<MemoryEntry>, LumenAiError>;

    async fn delete(
        &self,
        persona_id: Option<&str>,
        timestamp: &MessageId,
    ) -> Result<(), LumenAiError>;

    async fn clear(&self, persona_id: Option<&str>) -> Result<(), LumenAiError>;
}

#[async_trait]
pub trait PersonaDirectory: Send + Sync {
    async fn list(&self, public_only: bool) -> Result<PersonaListing, LumenAiError>;

    async fn lookup(&self, persona_id: &str) -> Result<Option<PersonaSummary>, LumenAiError> {
        let listing = self.list(false).await?;
        Ok(listing.find(persona_id).cloned())
    }
}
