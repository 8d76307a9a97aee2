//! Application state wiring the backend into the session and catalog.
//!
//! AppState holds the concrete instances used by both CLI commands and the
//! HTTP server. `ChatSession` and `ConversationCatalog` are generic over the
//! repository/transport traits; AppState pins them to [`Backend`].

use std::path::PathBuf;
use std::sync::Arc;

use lmchat_core::catalog::ConversationCatalog;
use lmchat_core::chat::ChatSession;
use lmchat_infra::backend::Backend;
use lmchat_types::config::ChatConfig;

/// Concrete type aliases for the core generics pinned to infra implementations.
pub type ConcreteSession = ChatSession<Backend, Backend>;
pub type ConcreteCatalog = ConversationCatalog<Backend>;

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<ConcreteSession>,
    pub catalog: Arc<ConcreteCatalog>,
    pub config: ChatConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Open the backend `config` selects.
    pub async fn with_config(config: ChatConfig, data_dir: PathBuf) -> anyhow::Result<Self> {
        let backend = Backend::open(&config, &data_dir).await?;
        Ok(Self::from_backend(backend, config, data_dir))
    }

    pub fn from_backend(backend: Backend, config: ChatConfig, data_dir: PathBuf) -> Self {
        Self {
            session: Arc::new(ChatSession::new(backend.clone(), backend.clone())),
            catalog: Arc::new(ConversationCatalog::new(backend)),
            config,
            data_dir,
        }
    }

    /// The backend the store operations go through.
    pub fn backend(&self) -> &Backend {
        self.session.repository()
    }
}
