//! Bulk import of foreign conversation records.
//!
//! Records coming from an export file carry ids and names chosen by another
//! store. The merger drops the ids, renames on collision by appending `"1"`
//! until the name is free, and inserts every record through one
//! [`ImportTransaction`]. A record that fails is reported on its own and the
//! rest of the batch still goes in.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use lmchat_types::conversation::Conversation;
use lmchat_types::error::RepositoryError;

use crate::repository::{ConversationRepository, ImportTransaction};

/// Suffix appended to a colliding name until it is unique.
pub const COLLISION_SUFFIX: &str = "1";

/// One record that could not be imported.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportFailure {
    /// Position of the record in the input batch.
    pub index: usize,
    /// Name the insert was attempted under (after renaming).
    pub name: String,
    pub error: String,
}

/// Outcome of an import batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    /// Number of records actually persisted.
    pub imported: usize,
    pub failures: Vec<ImportFailure>,
}

impl ImportReport {
    pub fn attempted(&self) -> usize {
        self.imported + self.failures.len()
    }
}

/// Pick the first free name by appending [`COLLISION_SUFFIX`].
pub fn resolve_name(name: &str, taken: &HashSet<String>) -> String {
    let mut candidate = name.to_string();
    while taken.contains(&candidate) {
        candidate.push_str(COLLISION_SUFFIX);
    }
    candidate
}

pub struct ImportMerger<'a, R: ConversationRepository> {
    repository: &'a R,
}

impl<'a, R: ConversationRepository> ImportMerger<'a, R> {
    pub fn new(repository: &'a R) -> Self {
        Self { repository }
    }

    /// Import `records` against the names currently in the store.
    pub async fn import_all(&self, records: Vec<Conversation>) -> Result<ImportReport, RepositoryError> {
        let existing_names = self
            .repository
            .list_summaries()
            .await?
            .into_iter()
            .map(|s| s.name)
            .collect();
        self.import(records, existing_names).await
    }

    /// Import `records`, treating `existing_names` as taken.
    ///
    /// Attempts are sequential, one per record. Each successful name joins
    /// the taken set immediately, so duplicates inside the batch are renamed
    /// too. Returns after every record was attempted and the batch committed.
    /// `Err` only when the batch itself cannot be opened or committed.
    pub async fn import(
        &self,
        records: Vec<Conversation>,
        mut existing_names: HashSet<String>,
    ) -> Result<ImportReport, RepositoryError> {
        let mut batch = self.repository.begin_import().await?;
        let mut report = ImportReport::default();

        for (index, mut record) in records.into_iter().enumerate() {
            record.id = None;
            let name = resolve_name(&record.name, &existing_names);
            if name != record.name {
                debug!(from = %record.name, to = %name, "Renamed colliding import");
                record.name = name;
            }

            match batch.insert(&record).await {
                Ok(id) => {
                    debug!(index, id, name = %record.name, "Imported conversation");
                    existing_names.insert(record.name);
                    report.imported += 1;
                }
                Err(e) => {
                    warn!(index, name = %record.name, error = %e, "Failed to import conversation");
                    report.failures.push(ImportFailure {
                        index,
                        name: record.name,
                        error: e.to_string(),
                    });
                }
            }
        }

        batch.commit().await?;
        info!(
            imported = report.imported,
            failed = report.failures.len(),
            "Import finished"
        );
        Ok(report)
    }
}
