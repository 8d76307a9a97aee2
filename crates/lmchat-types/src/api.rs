//! Request and response bodies of the `lmchat serve` HTTP dialect.
//!
//! Every JSON response carries `"status": "success"` or `"status": "error"`;
//! errors add a human-readable `message`. Shared by the server and by the
//! proxy client backend.

use serde::{Deserialize, Serialize};

use crate::conversation::{Conversation, ConversationId, ConversationSummary, Message, OptionOverrides};

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

/// Success envelope: `{"status": "success", ...payload}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: String,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn success(payload: T) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            payload,
        }
    }
}

/// Error body: `{"status": "error", "message": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatList {
    pub chats: Vec<ConversationSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    pub chat: Conversation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Created {
    pub id: ConversationId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelIds {
    pub models: Vec<String>,
}

/// Plain acknowledgement with a message, e.g. after a delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    pub message: String,
}

/// `POST /chat` body. Missing options take the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateChat {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(flatten)]
    pub overrides: OptionOverrides,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
}

impl CreateChat {
    /// Body that recreates `conversation` as a new record.
    pub fn from_conversation(conversation: &Conversation) -> Self {
        let options = &conversation.options;
        Self {
            name: conversation.name.clone(),
            model: conversation.model.clone(),
            overrides: OptionOverrides {
                temperature: Some(options.temperature),
                max_tokens: Some(options.max_tokens),
                top_k: Some(options.top_k),
                top_p: Some(options.top_p),
                repeat_penalty: Some(options.repeat_penalty),
                stream: Some(conversation.stream_enabled),
            },
            messages: conversation.messages.clone(),
        }
    }
}

/// `PUT /chat` body: append `message` and answer it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessage {
    pub id: ConversationId,
    pub message: Message,
}

/// `DELETE /chat/message` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteMessage {
    pub id: ConversationId,
    pub index: usize,
}

/// `?id=` query parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdQuery {
    pub id: ConversationId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_is_flat() {
        let json = serde_json::to_value(Envelope::success(Created { id: 4 })).unwrap();
        assert_eq!(json, serde_json::json!({"status": "success", "id": 4}));
    }

    #[test]
    fn test_create_chat_accepts_partial_options() {
        let body: CreateChat =
            serde_json::from_str(r#"{"name": "A", "model": "m", "temperature": 0.3}"#).unwrap();
        assert_eq!(body.overrides.temperature, Some(0.3));
        assert_eq!(body.overrides.top_k, None);
        assert!(body.messages.is_empty());
    }

    #[test]
    fn test_create_chat_from_conversation_keeps_everything() {
        let mut conversation = Conversation::new("A", "m", &OptionOverrides::default());
        conversation.messages.push(Message::user("hi"));
        let body = CreateChat::from_conversation(&conversation);

        let rebuilt = {
            let mut c = Conversation::new(body.name, body.model, &body.overrides);
            c.messages = body.messages;
            c
        };
        assert_eq!(rebuilt, conversation);
    }
}
