//! Backend selection.
//!
//! [`Backend`] is the one type the binary works with: the local SQLite store
//! plus LM Studio, or everything through an `lmchat serve` proxy. Both
//! variants offer the same capability set (list, load, create, update,
//! delete, send-and-stream, list models).

use std::path::Path;

use thiserror::Error;
use tracing::info;

use lmchat_core::chat::ChatTransport;
use lmchat_core::repository::{ConversationRepository, ImportTransaction};
use lmchat_types::config::{BackendKind, ChatConfig};
use lmchat_types::conversation::{Conversation, ConversationId, ConversationSummary, OptionOverrides};
use lmchat_types::error::{RepositoryError, StreamError};

use crate::llm::proxy::ProxyImport;
use crate::llm::{HttpTextSource, LmStudioTransport, ProxyClient};
use crate::sqlite::conversation::SqliteImport;
use crate::sqlite::{DatabasePool, SqliteConversationRepository};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to open database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Clone)]
pub enum Backend {
    Local {
        store: SqliteConversationRepository,
        llm: LmStudioTransport,
    },
    Proxy(ProxyClient),
}

impl Backend {
    /// Build the backend `config` selects. The local variant opens (and
    /// migrates) the database in `data_dir`.
    pub async fn open(config: &ChatConfig, data_dir: &Path) -> Result<Self, BackendError> {
        let backend = match config.backend {
            BackendKind::Local => {
                let pool = DatabasePool::open_in(data_dir).await?;
                Backend::Local {
                    store: SqliteConversationRepository::new(pool),
                    llm: LmStudioTransport::from_config(config)?,
                }
            }
            BackendKind::Proxy => Backend::Proxy(ProxyClient::from_config(config)?),
        };
        info!(backend = %backend.kind(), "Backend ready");
        Ok(backend)
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Local { .. } => BackendKind::Local,
            Backend::Proxy(_) => BackendKind::Proxy,
        }
    }
}

impl ConversationRepository for Backend {
    type Import = BackendImport;

    async fn create(
        &self,
        name: &str,
        model: &str,
        overrides: &OptionOverrides,
    ) -> Result<ConversationId, RepositoryError> {
        match self {
            Backend::Local { store, .. } => store.create(name, model, overrides).await,
            Backend::Proxy(client) => client.create(name, model, overrides).await,
        }
    }

    async fn list_summaries(&self) -> Result<Vec<ConversationSummary>, RepositoryError> {
        match self {
            Backend::Local { store, .. } => store.list_summaries().await,
            Backend::Proxy(client) => client.list_summaries().await,
        }
    }

    async fn load(&self, id: ConversationId) -> Result<Conversation, RepositoryError> {
        match self {
            Backend::Local { store, .. } => store.load(id).await,
            Backend::Proxy(client) => client.load(id).await,
        }
    }

    async fn update(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        match self {
            Backend::Local { store, .. } => store.update(conversation).await,
            Backend::Proxy(client) => client.update(conversation).await,
        }
    }

    async fn delete(&self, id: ConversationId) -> Result<(), RepositoryError> {
        match self {
            Backend::Local { store, .. } => store.delete(id).await,
            Backend::Proxy(client) => client.delete(id).await,
        }
    }

    async fn export_all(&self) -> Result<Vec<Conversation>, RepositoryError> {
        match self {
            Backend::Local { store, .. } => store.export_all().await,
            Backend::Proxy(client) => client.export_all().await,
        }
    }

    async fn begin_import(&self) -> Result<BackendImport, RepositoryError> {
        match self {
            Backend::Local { store, .. } => Ok(BackendImport::Local(store.begin_import().await?)),
            Backend::Proxy(client) => Ok(BackendImport::Proxy(client.begin_import().await?)),
        }
    }
}

pub enum BackendImport {
    Local(SqliteImport),
    Proxy(ProxyImport),
}

impl ImportTransaction for BackendImport {
    async fn insert(&mut self, conversation: &Conversation) -> Result<ConversationId, RepositoryError> {
        match self {
            BackendImport::Local(batch) => batch.insert(conversation).await,
            BackendImport::Proxy(batch) => batch.insert(conversation).await,
        }
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        match self {
            BackendImport::Local(batch) => batch.commit().await,
            BackendImport::Proxy(batch) => batch.commit().await,
        }
    }
}

impl ChatTransport for Backend {
    type Source = HttpTextSource;

    async fn send(&self, conversation: &Conversation) -> Result<HttpTextSource, StreamError> {
        match self {
            Backend::Local { llm, .. } => llm.send(conversation).await,
            Backend::Proxy(client) => client.send(conversation).await,
        }
    }

    async fn list_models(&self) -> Result<Vec<String>, StreamError> {
        match self {
            Backend::Local { llm, .. } => llm.list_models().await,
            Backend::Proxy(client) => client.list_models().await,
        }
    }
}
