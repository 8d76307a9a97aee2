//! ChatTransport trait definition.

use lmchat_types::conversation::Conversation;
use lmchat_types::error::StreamError;

use crate::stream::TextSource;

/// Backend capable of answering a conversation.
///
/// Implementations live in lmchat-infra (LM Studio over HTTP, the lmchat
/// proxy server). Uses native async fn in traits (RPITIT).
pub trait ChatTransport: Send + Sync {
    type Source: TextSource;

    /// Send the whole conversation and return the response body as a text
    /// source of `data:` frames.
    ///
    /// The last message is the user turn being answered. Non-incremental
    /// backends present their answer as one frame followed by the sentinel.
    fn send(
        &self,
        conversation: &Conversation,
    ) -> impl std::future::Future<Output = Result<Self::Source, StreamError>> + Send;

    /// Identifiers of the chat models the backend can serve.
    fn list_models(&self) -> impl std::future::Future<Output = Result<Vec<String>, StreamError>> + Send;
}
