//! Client for an `lmchat serve` instance.
//!
//! The server owns both the store and the LM Studio connection, so this one
//! client implements the repository and the transport. Imports go through
//! `POST /chat` one record at a time: each record is durable as soon as it
//! is accepted and there is no batch-level rollback.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::debug;

use lmchat_core::chat::ChatTransport;
use lmchat_core::repository::{ConversationRepository, ImportTransaction};
use lmchat_types::api::{
    ChatList, ChatRecord, CreateChat, Created, DeleteMessage, Envelope, ErrorBody, ModelIds, SendMessage,
};
use lmchat_types::config::ChatConfig;
use lmchat_types::conversation::{Conversation, ConversationId, ConversationSummary, OptionOverrides};
use lmchat_types::error::{RepositoryError, StreamError};

use super::check_status;
use super::source::HttpTextSource;

#[derive(Clone)]
pub struct ProxyClient {
    client: reqwest::Client,
    base_url: String,
}

impl ProxyClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &ChatConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            config.proxy_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Send a store request and decode the success envelope.
    async fn call<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, RepositoryError> {
        let response = request
            .send()
            .await
            .map_err(|e| RepositoryError::Persistence(format!("request to proxy failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.message,
                Err(_) => status.to_string(),
            };
            return Err(match status.as_u16() {
                404 => RepositoryError::NotFound,
                409 => RepositoryError::ConstraintViolation(message),
                _ => RepositoryError::Persistence(format!("HTTP {status}: {message}")),
            });
        }

        response
            .json::<Envelope<T>>()
            .await
            .map(|envelope| envelope.payload)
            .map_err(|e| RepositoryError::Persistence(format!("invalid proxy response: {e}")))
    }

    async fn post_chat(&self, body: &CreateChat) -> Result<ConversationId, RepositoryError> {
        let created: Created = self.call(self.client.post(self.url("/chat")).json(body)).await?;
        Ok(created.id)
    }

    /// Remove the message at `index` from a stored conversation.
    pub async fn delete_message(&self, id: ConversationId, index: usize) -> Result<(), RepositoryError> {
        let body = DeleteMessage { id, index };
        self.call::<serde_json::Value>(self.client.delete(self.url("/chat/message")).json(&body))
            .await?;
        Ok(())
    }

    /// Ask the server to cancel the exchange running for `id`.
    pub async fn cancel(&self, id: ConversationId) -> Result<(), RepositoryError> {
        self.call::<serde_json::Value>(self.client.post(self.url("/chat/cancel")).query(&[("id", id)]))
            .await?;
        Ok(())
    }
}

impl ConversationRepository for ProxyClient {
    type Import = ProxyImport;

    async fn create(
        &self,
        name: &str,
        model: &str,
        overrides: &OptionOverrides,
    ) -> Result<ConversationId, RepositoryError> {
        let body = CreateChat {
            name: name.to_string(),
            model: model.to_string(),
            overrides: overrides.clone(),
            messages: Vec::new(),
        };
        self.post_chat(&body).await
    }

    async fn list_summaries(&self) -> Result<Vec<ConversationSummary>, RepositoryError> {
        let list: ChatList = self.call(self.client.get(self.url("/chats"))).await?;
        Ok(list.chats)
    }

    async fn load(&self, id: ConversationId) -> Result<Conversation, RepositoryError> {
        let record: ChatRecord = self
            .call(self.client.get(self.url("/chat")).query(&[("id", id)]))
            .await?;
        Ok(record.chat)
    }

    async fn update(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        if conversation.id.is_none() {
            return Err(RepositoryError::NotFound);
        }
        self.call::<serde_json::Value>(self.client.patch(self.url("/chat")).json(conversation))
            .await?;
        Ok(())
    }

    async fn delete(&self, id: ConversationId) -> Result<(), RepositoryError> {
        self.call::<serde_json::Value>(self.client.delete(self.url("/chat")).query(&[("id", id)]))
            .await?;
        Ok(())
    }

    async fn export_all(&self) -> Result<Vec<Conversation>, RepositoryError> {
        let mut conversations = Vec::new();
        for summary in self.list_summaries().await? {
            match self.load(summary.id).await {
                Ok(conversation) => conversations.push(conversation),
                // Deleted between listing and loading.
                Err(RepositoryError::NotFound) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(conversations)
    }

    async fn begin_import(&self) -> Result<ProxyImport, RepositoryError> {
        Ok(ProxyImport { client: self.clone() })
    }
}

/// Record-at-a-time import through `POST /chat`.
pub struct ProxyImport {
    client: ProxyClient,
}

impl ImportTransaction for ProxyImport {
    async fn insert(&mut self, conversation: &Conversation) -> Result<ConversationId, RepositoryError> {
        self.client.post_chat(&CreateChat::from_conversation(conversation)).await
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

impl ChatTransport for ProxyClient {
    type Source = HttpTextSource;

    /// `PUT /chat` with the last message; the server appends it, relays the
    /// upstream frames and stores the reply.
    async fn send(&self, conversation: &Conversation) -> Result<HttpTextSource, StreamError> {
        let id = conversation
            .id
            .ok_or_else(|| StreamError::Transport("conversation has no id".to_string()))?;
        let message = conversation
            .last_message()
            .cloned()
            .ok_or_else(|| StreamError::Transport("conversation has no message to send".to_string()))?;
        debug!(conversation_id = id, "Sending message through proxy");

        let response = self
            .client
            .put(self.url("/chat"))
            .json(&SendMessage { id, message })
            .send()
            .await
            .map_err(|e| StreamError::Transport(format!("request to proxy failed: {e}")))?;
        let response = check_status(response).await?;
        Ok(HttpTextSource::from_response(response))
    }

    async fn list_models(&self) -> Result<Vec<String>, StreamError> {
        let response = self
            .client
            .get(self.url("/models"))
            .send()
            .await
            .map_err(|e| StreamError::Transport(format!("request to proxy failed: {e}")))?;
        let response = check_status(response).await?;

        let models: Envelope<ModelIds> = response
            .json()
            .await
            .map_err(|e| StreamError::Parse(format!("invalid model list: {e}")))?;
        Ok(models.payload.models)
    }
}
