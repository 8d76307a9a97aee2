//! In-memory conversation repository.
//!
//! Same contract as the SQLite store (unique names, ids that are never
//! reused, staged imports that commit together). Useful for tests and for
//! running without a database.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use lmchat_types::conversation::{Conversation, ConversationId, ConversationSummary, OptionOverrides};
use lmchat_types::error::RepositoryError;

use super::conversation::{ConversationRepository, ImportTransaction};

#[derive(Debug, Default)]
struct State {
    last_id: ConversationId,
    records: BTreeMap<ConversationId, Conversation>,
}

impl State {
    fn name_taken(&self, name: &str, except: Option<ConversationId>) -> bool {
        self.records
            .values()
            .any(|c| c.name == name && c.id != except)
    }

    fn next_id(&mut self) -> ConversationId {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryConversationRepository {
    state: Arc<Mutex<State>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, RepositoryError> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<State>) -> Result<MutexGuard<'_, State>, RepositoryError> {
    state
        .lock()
        .map_err(|e| RepositoryError::Persistence(format!("failed to lock conversations: {e}")))
}

fn name_conflict(name: &str) -> RepositoryError {
    RepositoryError::ConstraintViolation(format!("name '{name}' already exists"))
}

impl ConversationRepository for InMemoryConversationRepository {
    type Import = InMemoryImport;

    async fn create(
        &self,
        name: &str,
        model: &str,
        overrides: &OptionOverrides,
    ) -> Result<ConversationId, RepositoryError> {
        let mut state = self.lock()?;
        if state.name_taken(name, None) {
            return Err(name_conflict(name));
        }
        let id = state.next_id();
        let mut conversation = Conversation::new(name, model, overrides);
        conversation.id = Some(id);
        state.records.insert(id, conversation);
        Ok(id)
    }

    async fn list_summaries(&self) -> Result<Vec<ConversationSummary>, RepositoryError> {
        let state = self.lock()?;
        Ok(state.records.values().filter_map(Conversation::summary).collect())
    }

    async fn load(&self, id: ConversationId) -> Result<Conversation, RepositoryError> {
        let state = self.lock()?;
        state.records.get(&id).cloned().ok_or(RepositoryError::NotFound)
    }

    async fn update(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let id = conversation.id.ok_or(RepositoryError::NotFound)?;
        let mut state = self.lock()?;
        if !state.records.contains_key(&id) {
            return Err(RepositoryError::NotFound);
        }
        if state.name_taken(&conversation.name, Some(id)) {
            return Err(name_conflict(&conversation.name));
        }
        state.records.insert(id, conversation.clone());
        Ok(())
    }

    async fn delete(&self, id: ConversationId) -> Result<(), RepositoryError> {
        self.lock()?.records.remove(&id);
        Ok(())
    }

    async fn export_all(&self) -> Result<Vec<Conversation>, RepositoryError> {
        Ok(self.lock()?.records.values().cloned().collect())
    }

    async fn begin_import(&self) -> Result<InMemoryImport, RepositoryError> {
        Ok(InMemoryImport {
            state: self.state.clone(),
            staged: Vec::new(),
        })
    }
}

/// Staged import: records are checked on insert and applied on commit.
#[derive(Debug)]
pub struct InMemoryImport {
    state: Arc<Mutex<State>>,
    staged: Vec<Conversation>,
}

impl ImportTransaction for InMemoryImport {
    async fn insert(&mut self, conversation: &Conversation) -> Result<ConversationId, RepositoryError> {
        let mut state = lock_state(&self.state)?;
        let staged_names: HashSet<&str> = self.staged.iter().map(|c| c.name.as_str()).collect();
        if state.name_taken(&conversation.name, None) || staged_names.contains(conversation.name.as_str()) {
            return Err(name_conflict(&conversation.name));
        }
        let id = state.next_id();
        drop(state);

        let mut record = conversation.clone();
        record.id = Some(id);
        self.staged.push(record);
        Ok(id)
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        let mut state = lock_state(&self.state)?;
        for record in self.staged {
            if let Some(id) = record.id {
                state.records.insert(id, record);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_are_never_reused() {
        let repo = InMemoryConversationRepository::new();
        let a = repo.create("A", "m", &OptionOverrides::default()).await.unwrap();
        repo.delete(a).await.unwrap();
        let b = repo.create("A", "m", &OptionOverrides::default()).await.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_update_rejects_name_of_other_record() {
        let repo = InMemoryConversationRepository::new();
        repo.create("A", "m", &OptionOverrides::default()).await.unwrap();
        let b = repo.create("B", "m", &OptionOverrides::default()).await.unwrap();

        let mut record = repo.load(b).await.unwrap();
        record.name = "A".into();
        let err = repo.update(&record).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ConstraintViolation(_)));
        assert_eq!(repo.load(b).await.unwrap().name, "B");
    }

    #[tokio::test]
    async fn test_import_is_invisible_until_commit() {
        let repo = InMemoryConversationRepository::new();
        let mut import = repo.begin_import().await.unwrap();
        import
            .insert(&Conversation::new("staged", "m", &OptionOverrides::default()))
            .await
            .unwrap();

        assert!(repo.list_summaries().await.unwrap().is_empty());
        import.commit().await.unwrap();
        assert_eq!(repo.list_summaries().await.unwrap().len(), 1);
    }
}
