//! Cached listing of stored conversations.
//!
//! Keeps the summary list in memory so listings do not hit the store every
//! time, and keeps it in step with the mutations made through it.

use tokio::sync::RwLock;
use tracing::debug;

use lmchat_types::conversation::{ConversationId, ConversationSummary, OptionOverrides};
use lmchat_types::error::RepositoryError;

use crate::repository::ConversationRepository;

pub struct ConversationCatalog<R: ConversationRepository> {
    repository: R,
    cache: RwLock<Option<Vec<ConversationSummary>>>,
}

impl<R: ConversationRepository> ConversationCatalog<R> {
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            cache: RwLock::new(None),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Reload the listing from the store.
    pub async fn refresh(&self) -> Result<Vec<ConversationSummary>, RepositoryError> {
        let summaries = self.repository.list_summaries().await?;
        debug!(count = summaries.len(), "Refreshed conversation catalog");
        *self.cache.write().await = Some(summaries.clone());
        Ok(summaries)
    }

    /// The cached listing, loading it on first use.
    pub async fn summaries(&self) -> Result<Vec<ConversationSummary>, RepositoryError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            return Ok(cached.clone());
        }
        self.refresh().await
    }

    pub async fn create(
        &self,
        name: &str,
        model: &str,
        overrides: &OptionOverrides,
    ) -> Result<ConversationId, RepositoryError> {
        let id = self.repository.create(name, model, overrides).await?;
        if let Some(cached) = self.cache.write().await.as_mut() {
            cached.push(ConversationSummary {
                id,
                name: name.to_string(),
                model: model.to_string(),
            });
        }
        Ok(id)
    }

    /// Delete from the store, then drop the entry from the listing.
    pub async fn delete(&self, id: ConversationId) -> Result<(), RepositoryError> {
        self.repository.delete(id).await?;
        if let Some(cached) = self.cache.write().await.as_mut() {
            cached.retain(|s| s.id != id);
        }
        Ok(())
    }

    pub async fn rename(&self, id: ConversationId, name: &str) -> Result<(), RepositoryError> {
        let mut conversation = self.repository.load(id).await?;
        conversation.name = name.to_string();
        self.repository.update(&conversation).await?;
        if let Some(cached) = self.cache.write().await.as_mut() {
            if let Some(entry) = cached.iter_mut().find(|s| s.id == id) {
                entry.name = name.to_string();
            }
        }
        Ok(())
    }

    /// Forget the cached listing; the next read goes to the store.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }
}
