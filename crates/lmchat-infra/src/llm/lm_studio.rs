//! LM Studio transport over its OpenAI-compatible HTTP API.

use std::time::Duration;

use tracing::debug;

use lmchat_core::chat::ChatTransport;
use lmchat_types::config::ChatConfig;
use lmchat_types::conversation::Conversation;
use lmchat_types::error::StreamError;
use lmchat_types::stream::ModelList;

use super::check_status;
use super::source::HttpTextSource;

/// Model ids with this prefix are embedding models and cannot chat.
const EMBEDDING_PREFIX: &str = "text-embedding";

/// Posts conversations to `{base_url}/chat/completions`.
#[derive(Clone)]
pub struct LmStudioTransport {
    client: reqwest::Client,
    base_url: String,
}

impl LmStudioTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &ChatConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            config.lm_studio_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// The conversation as a completion request: everything but the local
    /// `id` and `name`.
    fn request_body(conversation: &Conversation) -> Result<serde_json::Value, StreamError> {
        let mut body = serde_json::to_value(conversation)
            .map_err(|e| StreamError::Parse(format!("failed to encode request: {e}")))?;
        if let Some(fields) = body.as_object_mut() {
            fields.remove("id");
            fields.remove("name");
        }
        Ok(body)
    }
}

impl ChatTransport for LmStudioTransport {
    type Source = HttpTextSource;

    async fn send(&self, conversation: &Conversation) -> Result<HttpTextSource, StreamError> {
        let body = Self::request_body(conversation)?;
        debug!(
            model = %conversation.model,
            messages = conversation.messages.len(),
            stream = conversation.stream_enabled,
            "Posting chat completion"
        );

        let response = self
            .client
            .post(self.url("/chat/completions"))
            .json(&body)
            .send()
            .await
            .map_err(|e| StreamError::Transport(format!("request to LM Studio failed: {e}")))?;
        let response = check_status(response).await?;

        if conversation.stream_enabled {
            Ok(HttpTextSource::from_response(response))
        } else {
            Ok(HttpTextSource::from_completion(response))
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, StreamError> {
        let response = self
            .client
            .get(self.url("/models"))
            .send()
            .await
            .map_err(|e| StreamError::Transport(format!("request to LM Studio failed: {e}")))?;
        let response = check_status(response).await?;

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| StreamError::Parse(format!("invalid model list: {e}")))?;

        Ok(list
            .data
            .into_iter()
            .map(|model| model.id)
            .filter(|id| !id.starts_with(EMBEDDING_PREFIX))
            .collect())
    }
}
