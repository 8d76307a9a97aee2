//! SQLite conversation repository implementation.
//!
//! Implements `ConversationRepository` from `lmchat-core` using sqlx with split
//! read/write pools. Messages are stored as a JSON array in one TEXT column.

use sqlx::{Acquire, Row, Sqlite, Transaction};
use tracing::debug;

use lmchat_core::repository::{ConversationRepository, ImportTransaction};
use lmchat_types::conversation::{
    Conversation, ConversationId, ConversationOptions, ConversationSummary, Message, OptionOverrides,
};
use lmchat_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ConversationRepository`.
#[derive(Clone)]
pub struct SqliteConversationRepository {
    pool: DatabasePool,
}

impl SqliteConversationRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Internal row type for mapping SQLite rows to domain Conversation.
struct ConversationRow {
    id: i64,
    name: String,
    model: String,
    temperature: f64,
    max_tokens: i64,
    top_k: i64,
    top_p: f64,
    repeat_penalty: f64,
    stream: bool,
    messages: String,
}

impl ConversationRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            model: row.try_get("model")?,
            temperature: row.try_get("temperature")?,
            max_tokens: row.try_get("max_tokens")?,
            top_k: row.try_get("top_k")?,
            top_p: row.try_get("top_p")?,
            repeat_penalty: row.try_get("repeat_penalty")?,
            stream: row.try_get("stream")?,
            messages: row.try_get("messages")?,
        })
    }

    fn into_conversation(self) -> Result<Conversation, RepositoryError> {
        let messages: Vec<Message> = serde_json::from_str(&self.messages)
            .map_err(|e| RepositoryError::Persistence(format!("invalid messages JSON: {e}")))?;

        Ok(Conversation {
            id: Some(self.id),
            name: self.name,
            model: self.model,
            options: ConversationOptions {
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                top_k: self.top_k,
                top_p: self.top_p,
                repeat_penalty: self.repeat_penalty,
            },
            stream_enabled: self.stream,
            messages,
        })
    }
}

fn messages_json(conversation: &Conversation) -> Result<String, RepositoryError> {
    serde_json::to_string(&conversation.messages).map_err(|e| RepositoryError::Persistence(e.to_string()))
}

/// Map a failed write, turning a broken name index into `ConstraintViolation`.
fn write_error(e: sqlx::Error, name: &str) -> RepositoryError {
    match e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            RepositoryError::ConstraintViolation(format!("name '{name}' already exists"))
        }
        e => RepositoryError::Persistence(e.to_string()),
    }
}

const INSERT_SQL: &str = "INSERT INTO conversations (name, model, temperature, max_tokens, top_k, top_p, repeat_penalty, stream, messages)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

fn insert_query<'q>(
    conversation: &'q Conversation,
    messages: String,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    sqlx::query(INSERT_SQL)
        .bind(&conversation.name)
        .bind(&conversation.model)
        .bind(conversation.options.temperature)
        .bind(conversation.options.max_tokens)
        .bind(conversation.options.top_k)
        .bind(conversation.options.top_p)
        .bind(conversation.options.repeat_penalty)
        .bind(conversation.stream_enabled)
        .bind(messages)
}

impl ConversationRepository for SqliteConversationRepository {
    type Import = SqliteImport;

    async fn create(
        &self,
        name: &str,
        model: &str,
        overrides: &OptionOverrides,
    ) -> Result<ConversationId, RepositoryError> {
        let conversation = Conversation::new(name, model, overrides);
        let messages = messages_json(&conversation)?;

        let result = insert_query(&conversation, messages)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| write_error(e, name))?;

        let id = result.last_insert_rowid();
        debug!(id, name, "Created conversation");
        Ok(id)
    }

    async fn list_summaries(&self) -> Result<Vec<ConversationSummary>, RepositoryError> {
        let rows = sqlx::query("SELECT id, name, model FROM conversations ORDER BY id ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Persistence(e.to_string()))?;

        rows.iter()
            .map(|row| -> Result<ConversationSummary, sqlx::Error> {
                Ok(ConversationSummary {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    model: row.try_get("model")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RepositoryError::Persistence(e.to_string()))
    }

    async fn load(&self, id: ConversationId) -> Result<Conversation, RepositoryError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Persistence(e.to_string()))?;

        match row {
            Some(row) => ConversationRow::from_row(&row)
                .map_err(|e| RepositoryError::Persistence(e.to_string()))?
                .into_conversation(),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn update(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let id = conversation.id.ok_or(RepositoryError::NotFound)?;
        let messages = messages_json(conversation)?;

        let result = sqlx::query(
            "UPDATE conversations SET name = ?, model = ?, temperature = ?, max_tokens = ?, top_k = ?, top_p = ?, repeat_penalty = ?, stream = ?, messages = ?
             WHERE id = ?",
        )
        .bind(&conversation.name)
        .bind(&conversation.model)
        .bind(conversation.options.temperature)
        .bind(conversation.options.max_tokens)
        .bind(conversation.options.top_k)
        .bind(conversation.options.top_p)
        .bind(conversation.options.repeat_penalty)
        .bind(conversation.stream_enabled)
        .bind(messages)
        .bind(id)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| write_error(e, &conversation.name))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        debug!(id, messages = conversation.messages.len(), "Updated conversation");
        Ok(())
    }

    async fn delete(&self, id: ConversationId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Persistence(e.to_string()))?;

        debug!(id, deleted = result.rows_affected(), "Deleted conversation");
        Ok(())
    }

    async fn export_all(&self) -> Result<Vec<Conversation>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM conversations ORDER BY id ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Persistence(e.to_string()))?;

        rows.iter()
            .map(|row| {
                ConversationRow::from_row(row)
                    .map_err(|e| RepositoryError::Persistence(e.to_string()))?
                    .into_conversation()
            })
            .collect()
    }

    async fn begin_import(&self) -> Result<SqliteImport, RepositoryError> {
        let tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Persistence(e.to_string()))?;
        Ok(SqliteImport { tx })
    }
}

/// One write transaction holding an import batch.
///
/// Each insert runs in its own savepoint, so a failed record is rolled back
/// alone. Dropping the batch without [`commit`](ImportTransaction::commit)
/// rolls everything back.
pub struct SqliteImport {
    tx: Transaction<'static, Sqlite>,
}

impl ImportTransaction for SqliteImport {
    async fn insert(&mut self, conversation: &Conversation) -> Result<ConversationId, RepositoryError> {
        let messages = messages_json(conversation)?;
        let mut savepoint = self
            .tx
            .begin()
            .await
            .map_err(|e| RepositoryError::Persistence(e.to_string()))?;

        match insert_query(conversation, messages).execute(&mut *savepoint).await {
            Ok(result) => {
                savepoint
                    .commit()
                    .await
                    .map_err(|e| RepositoryError::Persistence(e.to_string()))?;
                Ok(result.last_insert_rowid())
            }
            Err(e) => {
                savepoint
                    .rollback()
                    .await
                    .map_err(|e| RepositoryError::Persistence(e.to_string()))?;
                Err(write_error(e, &conversation.name))
            }
        }
    }

    async fn commit(self) -> Result<(), RepositoryError> {
        self.tx
            .commit()
            .await
            .map_err(|e| RepositoryError::Persistence(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lmchat_core::import::ImportMerger;
    use tempfile::TempDir;

    async fn test_repo() -> (SqliteConversationRepository, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::open_in(dir.path()).await.unwrap();
        (SqliteConversationRepository::new(pool), dir)
    }

    fn foreign(name: &str) -> Conversation {
        let mut conversation = Conversation::new(name, "llama-3", &OptionOverrides::default());
        conversation.id = Some(500);
        conversation.messages.push(Message::user("imported"));
        conversation
    }

    #[tokio::test]
    async fn test_create_and_load_with_defaults() {
        let (repo, _dir) = test_repo().await;
        let id = repo.create("Notes", "qwen2.5-7b", &OptionOverrides::default()).await.unwrap();

        let loaded = repo.load(id).await.unwrap();
        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.name, "Notes");
        assert_eq!(loaded.model, "qwen2.5-7b");
        assert_eq!(loaded.options, ConversationOptions::default());
        assert!(loaded.stream_enabled);
        assert!(loaded.messages.is_empty());
    }

    #[tokio::test]
    async fn test_create_keeps_overrides() {
        let (repo, _dir) = test_repo().await;
        let overrides = OptionOverrides {
            max_tokens: Some(512),
            stream: Some(false),
            ..Default::default()
        };
        let id = repo.create("Short", "m", &overrides).await.unwrap();

        let loaded = repo.load(id).await.unwrap();
        assert_eq!(loaded.options.max_tokens, 512);
        assert_eq!(loaded.options.top_k, 40);
        assert!(!loaded.stream_enabled);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_constraint_violation() {
        let (repo, _dir) = test_repo().await;
        let id = repo.create("A", "first", &OptionOverrides::default()).await.unwrap();

        let err = repo.create("A", "second", &OptionOverrides::default()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ConstraintViolation(_)));

        let summaries = repo.list_summaries().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(repo.load(id).await.unwrap().model, "first");
    }

    #[tokio::test]
    async fn test_update_replaces_record() {
        let (repo, _dir) = test_repo().await;
        let id = repo.create("A", "m", &OptionOverrides::default()).await.unwrap();

        let mut conversation = repo.load(id).await.unwrap();
        conversation.name = "Renamed".into();
        conversation.options.temperature = 0.1;
        conversation.messages = vec![Message::user("hi"), Message::assistant("hello")];
        repo.update(&conversation).await.unwrap();

        assert_eq!(repo.load(id).await.unwrap(), conversation);
    }

    #[tokio::test]
    async fn test_update_missing_or_unsaved_is_not_found() {
        let (repo, _dir) = test_repo().await;
        let mut conversation = Conversation::new("ghost", "m", &OptionOverrides::default());
        assert!(matches!(repo.update(&conversation).await, Err(RepositoryError::NotFound)));

        conversation.id = Some(77);
        assert!(matches!(repo.update(&conversation).await, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_update_name_collision() {
        let (repo, _dir) = test_repo().await;
        repo.create("A", "m", &OptionOverrides::default()).await.unwrap();
        let b = repo.create("B", "m", &OptionOverrides::default()).await.unwrap();

        let mut conversation = repo.load(b).await.unwrap();
        conversation.name = "A".into();
        let err = repo.update(&conversation).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_delete_then_load_is_not_found() {
        let (repo, _dir) = test_repo().await;
        let id = repo.create("A", "m", &OptionOverrides::default()).await.unwrap();

        repo.delete(id).await.unwrap();
        assert!(matches!(repo.load(id).await, Err(RepositoryError::NotFound)));
        // Absent ids delete without error
        repo.delete(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_delete() {
        let (repo, _dir) = test_repo().await;
        let a = repo.create("A", "m", &OptionOverrides::default()).await.unwrap();
        let b = repo.create("B", "m", &OptionOverrides::default()).await.unwrap();
        repo.delete(b).await.unwrap();

        let c = repo.create("C", "m", &OptionOverrides::default()).await.unwrap();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn test_list_summaries_in_id_order() {
        let (repo, _dir) = test_repo().await;
        for name in ["z", "a", "m"] {
            repo.create(name, "model", &OptionOverrides::default()).await.unwrap();
        }

        let names: Vec<String> = repo.list_summaries().await.unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }

    #[tokio::test]
    async fn test_import_merges_with_renames() {
        let (repo, _dir) = test_repo().await;
        repo.create("A", "m", &OptionOverrides::default()).await.unwrap();

        let report = ImportMerger::new(&repo)
            .import_all(vec![foreign("A"), foreign("A"), foreign("B")])
            .await
            .unwrap();
        assert_eq!(report.imported, 3);

        let exported = repo.export_all().await.unwrap();
        let names: Vec<&str> = exported.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "A1", "A11", "B"]);
        assert!(exported.iter().all(|c| c.id != Some(500)));
        assert_eq!(exported[3].messages, vec![Message::user("imported")]);
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back_only_its_savepoint() {
        let (repo, _dir) = test_repo().await;
        repo.create("taken", "m", &OptionOverrides::default()).await.unwrap();

        let mut import = repo.begin_import().await.unwrap();
        import.insert(&foreign("x")).await.unwrap();
        let err = import.insert(&foreign("taken")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ConstraintViolation(_)));
        import.insert(&foreign("y")).await.unwrap();
        import.commit().await.unwrap();

        let names: Vec<String> = repo.list_summaries().await.unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["taken", "x", "y"]);
    }

    #[tokio::test]
    async fn test_uncommitted_import_is_rolled_back() {
        let (repo, _dir) = test_repo().await;
        {
            let mut import = repo.begin_import().await.unwrap();
            import.insert(&foreign("x")).await.unwrap();
        }

        assert!(repo.list_summaries().await.unwrap().is_empty());
        repo.create("after", "m", &OptionOverrides::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let repo = SqliteConversationRepository::new(DatabasePool::open_in(dir.path()).await.unwrap());
            let id = repo.create("durable", "m", &OptionOverrides::default()).await.unwrap();
            let mut conversation = repo.load(id).await.unwrap();
            conversation.messages.push(Message::user("remember me"));
            repo.update(&conversation).await.unwrap();
            id
        };

        let repo = SqliteConversationRepository::new(DatabasePool::open_in(dir.path()).await.unwrap());
        let loaded = repo.load(id).await.unwrap();
        assert_eq!(loaded.messages, vec![Message::user("remember me")]);
    }
}
