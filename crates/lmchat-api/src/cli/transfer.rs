//! `lmchat export` and `lmchat import`.
//!
//! The file format is a JSON array of full conversation records. Ids in an
//! imported file are ignored and missing option fields take the defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use console::style;

use lmchat_core::import::{ImportMerger, ImportReport};
use lmchat_core::repository::ConversationRepository;
use lmchat_types::conversation::Conversation;

use crate::state::AppState;

/// Write every conversation to `file`, or to stdout when `None`.
pub async fn export(state: &AppState, file: Option<PathBuf>, json: bool) -> Result<()> {
    let records = state.backend().export_all().await?;
    let body = serde_json::to_string_pretty(&records)?;

    let Some(path) = file else {
        println!("{body}");
        return Ok(());
    };

    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "exported": records.len(), "file": path.display().to_string() })
        );
    } else {
        println!(
            "  {} Exported {} conversation(s) to {}",
            style("✓").green().bold(),
            records.len(),
            style(path.display()).cyan()
        );
    }
    Ok(())
}

/// Parse an export file.
pub async fn read_records(path: &Path) -> Result<Vec<Conversation>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not a conversation export", path.display()))
}

/// Merge the records in `file` into the store, renaming on collision.
pub async fn import(state: &AppState, file: &Path, json: bool) -> Result<()> {
    let records = read_records(file).await?;
    let report = ImportMerger::new(state.backend()).import_all(records).await?;
    state.catalog.invalidate().await;

    if json {
        print_report_json(&report)?;
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report_json(report: &ImportReport) -> Result<()> {
    let failures: Vec<_> = report
        .failures
        .iter()
        .map(|f| serde_json::json!({ "index": f.index, "name": f.name, "error": f.error }))
        .collect();
    let body = serde_json::json!({
        "attempted": report.attempted(),
        "imported": report.imported,
        "failures": failures,
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn print_report(report: &ImportReport) {
    println!();
    println!(
        "  {} Imported {} of {} conversation(s)",
        style("✓").green().bold(),
        report.imported,
        report.attempted()
    );
    for failure in &report.failures {
        println!(
            "  {} #{} '{}': {}",
            style("✗").red(),
            failure.index,
            failure.name,
            failure.error
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_records_defaults_missing_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("export.json");
        tokio::fs::write(
            &path,
            r#"[{"id": 17, "name": "Old", "model": "qwen", "messages": [{"role": "user", "content": "hi"}]}]"#,
        )
        .await
        .unwrap();

        let records = read_records(&path).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Old");
        assert_eq!(records[0].options.top_k, 40);
        assert!(records[0].stream_enabled);
        assert_eq!(records[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn test_read_records_rejects_non_array() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("export.json");
        tokio::fs::write(&path, r#"{"name": "A"}"#).await.unwrap();
        assert!(read_records(&path).await.is_err());
    }
}
