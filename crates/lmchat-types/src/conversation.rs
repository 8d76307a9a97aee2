//! Conversation types for lmchat.
//!
//! A [`Conversation`] is the persisted aggregate: its generation options,
//! the backend model it talks to, and the ordered message history.
//! The serialized shape is the one used for export/import files and for
//! the body sent to an OpenAI-compatible `/chat/completions` endpoint
//! (options are flattened to the top level, `streamEnabled` is `stream`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store-assigned conversation identifier.
pub type ConversationId = i64;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Numeric generation parameters sent with every completion request.
///
/// Opaque to the core: they are stored and forwarded, never interpreted.
/// Missing fields deserialize to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationOptions {
    pub temperature: f64,
    /// `-1` means "no limit" for LM Studio.
    pub max_tokens: i64,
    pub top_k: i64,
    pub top_p: f64,
    pub repeat_penalty: f64,
}

impl Default for ConversationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.85,
            max_tokens: -1,
            top_k: 40,
            top_p: 0.95,
            repeat_penalty: 1.1,
        }
    }
}

/// Caller-supplied option overrides for a new conversation.
///
/// Every field left as `None` takes the value from [`ConversationOptions::default`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl OptionOverrides {
    /// Merge these overrides over the defaults. Caller-supplied values win.
    pub fn resolve(&self) -> (ConversationOptions, bool) {
        let defaults = ConversationOptions::default();
        let options = ConversationOptions {
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            top_k: self.top_k.unwrap_or(defaults.top_k),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            repeat_penalty: self.repeat_penalty.unwrap_or(defaults.repeat_penalty),
        };
        (options, self.stream.unwrap_or(true))
    }
}

fn default_stream() -> bool {
    true
}

/// A persisted conversation.
///
/// `id` is `None` until the store assigns one; clients never choose it.
/// `name` is unique across the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ConversationId>,
    pub name: String,
    pub model: String,
    #[serde(flatten)]
    pub options: ConversationOptions,
    #[serde(rename = "stream", default = "default_stream")]
    pub stream_enabled: bool,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Build a new, not yet persisted conversation with an empty history.
    pub fn new(name: impl Into<String>, model: impl Into<String>, overrides: &OptionOverrides) -> Self {
        let (options, stream_enabled) = overrides.resolve();
        Self {
            id: None,
            name: name.into(),
            model: model.into(),
            options,
            stream_enabled,
            messages: Vec::new(),
        }
    }

    /// Project to the listing shape.
    pub fn summary(&self) -> Option<ConversationSummary> {
        self.id.map(|id| ConversationSummary {
            id,
            name: self.name.clone(),
            model: self.model.clone(),
        })
    }

    /// The most recent message, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Lightweight listing projection of a stored conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub name: String,
    pub model: String,
}
