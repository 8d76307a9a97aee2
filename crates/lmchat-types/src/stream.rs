//! Streaming completion types.
//!
//! Models the OpenAI-compatible `chat.completion.chunk` payload carried by
//! each `data:` line of an incremental response, and the [`StreamFrame`]
//! the frame parser turns each line into.

use serde::{Deserialize, Serialize};

use crate::error::{RepositoryError, StreamError};

/// Payload of the terminal sentinel line (`data: [DONE]`).
pub const DONE_SENTINEL: &str = "[DONE]";

/// One parsed protocol unit. Transient: never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// An incremental piece of assistant text (possibly empty).
    Fragment(String),
    /// End of stream. Carries no content.
    Done,
}

impl StreamFrame {
    /// The text after `data: ` for this frame.
    pub fn payload(&self) -> String {
        match self {
            StreamFrame::Fragment(text) => {
                serde_json::json!({"choices": [{"index": 0, "delta": {"content": text}}]}).to_string()
            }
            StreamFrame::Done => DONE_SENTINEL.to_string(),
        }
    }

    /// Encode as one event-stream line followed by the blank separator.
    pub fn to_line(&self) -> String {
        format!("data: {}\n\n", self.payload())
    }
}

/// A `chat.completion.chunk` object as sent by LM Studio and OpenAI.
///
/// Only the fields the aggregator needs are modeled; everything else
/// (`id`, `object`, `created`, `usage`, ...) is ignored on decode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl CompletionChunk {
    /// Build a single-choice chunk carrying `content`.
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: None,
                    content: Some(content.into()),
                },
                finish_reason: None,
            }],
        }
    }

    /// The fragment carried at `choices[0].delta.content`, or `""`.
    pub fn fragment(&self) -> &str {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .unwrap_or("")
    }
}

/// `kind` of an error frame whose reply could not be stored as-is.
pub const ERROR_KIND_NOT_FOUND: &str = "not_found";
pub const ERROR_KIND_CONSTRAINT: &str = "constraint_violation";
pub const ERROR_KIND_PERSISTENCE: &str = "persistence";

/// Failure relayed in-band as `data: {"error": "..."}`.
///
/// Without a `kind` the frame reports a backend (transport) failure. An
/// `lmchat serve` that streamed the reply but could not store it adds a
/// `kind` naming the store failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamErrorPayload {
    pub error: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl StreamErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: serde_json::Value::String(message.into()),
            kind: None,
        }
    }

    /// Error frame for a reply that streamed completely but was not stored.
    pub fn persistence(error: &RepositoryError) -> Self {
        let (kind, message) = match error {
            RepositoryError::NotFound => (ERROR_KIND_NOT_FOUND, error.to_string()),
            RepositoryError::ConstraintViolation(msg) => (ERROR_KIND_CONSTRAINT, msg.clone()),
            RepositoryError::Persistence(msg) => (ERROR_KIND_PERSISTENCE, msg.clone()),
        };
        Self {
            error: serde_json::Value::String(message),
            kind: Some(kind.to_string()),
        }
    }

    /// The text after `data: ` for this error.
    pub fn payload(&self) -> String {
        match &self.kind {
            Some(kind) => serde_json::json!({"error": self.error, "kind": kind}).to_string(),
            None => serde_json::json!({"error": self.error}).to_string(),
        }
    }

    /// Human-readable message, whether the backend sent a string or an object.
    pub fn message(&self) -> String {
        match &self.error {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Object(map) => map
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| self.error.to_string()),
            other => other.to_string(),
        }
    }

    /// The error this frame reports. Unknown kinds are transport failures.
    pub fn into_error(self) -> StreamError {
        let message = self.message();
        match self.kind.as_deref() {
            Some(ERROR_KIND_NOT_FOUND) => StreamError::Persistence(RepositoryError::NotFound),
            Some(ERROR_KIND_CONSTRAINT) => {
                StreamError::Persistence(RepositoryError::ConstraintViolation(message))
            }
            Some(ERROR_KIND_PERSISTENCE) => StreamError::Persistence(RepositoryError::Persistence(message)),
            _ => StreamError::Transport(message),
        }
    }
}

/// Non-incremental `chat.completion` response (used when streaming is off).
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

impl CompletionResponse {
    /// The answer at `choices[0].message.content`, or `""`.
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// `GET /models` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelList {
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub id: String,
}
