//! ConversationRepository trait definition.

use lmchat_types::conversation::{Conversation, ConversationId, ConversationSummary, OptionOverrides};
use lmchat_types::error::RepositoryError;

/// Repository trait for conversation persistence.
///
/// Every operation is independently atomic and durable before it returns.
/// `name` is unique across the store; any write that would break that fails
/// with [`RepositoryError::ConstraintViolation`].
///
/// Implementations live in lmchat-infra (e.g. `SqliteConversationRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait ConversationRepository: Send + Sync {
    /// Batch writer used by the import path.
    type Import: ImportTransaction;

    /// Create an empty conversation. Returns the store-assigned id.
    fn create(
        &self,
        name: &str,
        model: &str,
        overrides: &OptionOverrides,
    ) -> impl std::future::Future<Output = Result<ConversationId, RepositoryError>> + Send;

    /// List every stored conversation as a summary, in ascending id order.
    fn list_summaries(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationSummary>, RepositoryError>> + Send;

    /// Load one full conversation. `NotFound` if absent.
    fn load(
        &self,
        id: ConversationId,
    ) -> impl std::future::Future<Output = Result<Conversation, RepositoryError>> + Send;

    /// Replace the stored record matching `conversation.id`.
    ///
    /// `NotFound` if the id is absent or unset.
    fn update(
        &self,
        conversation: &Conversation,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a conversation. Deleting an absent id succeeds without effect.
    fn delete(
        &self,
        id: ConversationId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Every full record, in ascending id order.
    fn export_all(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Conversation>, RepositoryError>> + Send;

    /// Open a batch writer for importing records.
    fn begin_import(
        &self,
    ) -> impl std::future::Future<Output = Result<Self::Import, RepositoryError>> + Send;
}

/// A batch of inserts whose successful records become visible together.
///
/// A failed [`insert`](ImportTransaction::insert) affects only that record;
/// the batch stays usable.
pub trait ImportTransaction: Send {
    /// Insert a full record, ignoring any `id` it carries.
    fn insert(
        &mut self,
        conversation: &Conversation,
    ) -> impl std::future::Future<Output = Result<ConversationId, RepositoryError>> + Send;

    /// Make every successful insert visible.
    fn commit(self) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
