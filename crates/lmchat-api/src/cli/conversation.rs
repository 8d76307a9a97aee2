//! Conversation CLI commands: list, show, create, rename, delete, delete-message.

use anyhow::{bail, Result};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;

use lmchat_core::repository::ConversationRepository;
use lmchat_infra::backend::Backend;
use lmchat_types::conversation::{ConversationId, MessageRole, OptionOverrides};

use crate::state::AppState;

/// List all conversations in a table.
pub async fn list_conversations(state: &AppState, json: bool) -> Result<()> {
    let summaries = state.catalog.summaries().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!();
        println!("  No conversations yet. Create one with:");
        println!("    {}", style("lmchat create <name> --model <model>").cyan());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Model").fg(Color::White),
    ]);
    for summary in &summaries {
        table.add_row(vec![
            Cell::new(summary.id),
            Cell::new(&summary.name).fg(Color::Cyan),
            Cell::new(&summary.model),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!("  {} conversation(s)", summaries.len());
    println!();
    Ok(())
}

/// Show one conversation: options, then the message history.
pub async fn show_conversation(state: &AppState, id: ConversationId, json: bool) -> Result<()> {
    let conversation = state.backend().load(id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&conversation)?);
        return Ok(());
    }

    let options = &conversation.options;
    println!();
    println!("  {}  {}", style("Name:").bold(), style(&conversation.name).cyan());
    println!("  {}  {}", style("Model:").bold(), conversation.model);
    println!("  {}  {}", style("ID:").bold(), style(id).dim());
    println!(
        "  {}  temperature {} · max_tokens {} · top_k {} · top_p {} · repeat_penalty {} · stream {}",
        style("Options:").bold(),
        options.temperature,
        options.max_tokens,
        options.top_k,
        options.top_p,
        options.repeat_penalty,
        conversation.stream_enabled
    );
    println!();

    if conversation.messages.is_empty() {
        println!("  {}", style("No messages yet.").dim());
        println!();
        return Ok(());
    }

    for (index, message) in conversation.messages.iter().enumerate() {
        let role = match message.role {
            MessageRole::User => style(message.role.to_string()).green().bold(),
            MessageRole::Assistant => style(message.role.to_string()).cyan().bold(),
            MessageRole::System => style(message.role.to_string()).yellow().bold(),
        };
        println!("  {} {}", style(format!("[{index}]")).dim(), role);
        for line in message.content.lines() {
            println!("    {line}");
        }
        println!();
    }
    Ok(())
}

pub async fn create_conversation(
    state: &AppState,
    name: &str,
    model: &str,
    overrides: OptionOverrides,
    json: bool,
) -> Result<()> {
    if name.trim().is_empty() {
        bail!("conversation name must not be empty");
    }
    let id = state.catalog.create(name, model, &overrides).await?;

    if json {
        println!("{}", serde_json::json!({ "id": id, "name": name, "model": model }));
        return Ok(());
    }

    println!();
    println!("  {} Conversation created", style("✓").green().bold());
    println!();
    println!("  {}  {}", style("Name:").bold(), style(name).cyan());
    println!("  {}  {}", style("Model:").bold(), model);
    println!("  {}  {}", style("ID:").bold(), id);
    println!();
    println!("  Start chatting: {}", style(format!("lmchat chat {id} <prompt>")).cyan());
    println!();
    Ok(())
}

pub async fn rename_conversation(state: &AppState, id: ConversationId, name: &str, json: bool) -> Result<()> {
    if name.trim().is_empty() {
        bail!("conversation name must not be empty");
    }
    state.catalog.rename(id, name).await?;

    if json {
        println!("{}", serde_json::json!({ "id": id, "name": name }));
    } else {
        println!("  {} Renamed conversation {id} to '{}'", style("✓").green().bold(), style(name).cyan());
    }
    Ok(())
}

pub async fn delete_conversation(state: &AppState, id: ConversationId, json: bool) -> Result<()> {
    state.catalog.delete(id).await?;

    if json {
        println!("{}", serde_json::json!({ "id": id, "deleted": true }));
    } else {
        println!("  {} Deleted conversation {id}", style("✓").green().bold());
    }
    Ok(())
}

/// Remove one message. Through a proxy the server checks the index.
pub async fn delete_message(state: &AppState, id: ConversationId, index: usize, json: bool) -> Result<()> {
    match state.backend() {
        Backend::Proxy(client) => client.delete_message(id, index).await?,
        backend => {
            let mut conversation = backend.load(id).await?;
            if index >= conversation.messages.len() {
                bail!(
                    "invalid message index {index}: conversation {id} has {} message(s)",
                    conversation.messages.len()
                );
            }
            conversation.messages.remove(index);
            backend.update(&conversation).await?;
        }
    }

    if json {
        println!("{}", serde_json::json!({ "id": id, "index": index, "deleted": true }));
    } else {
        println!("  {} Deleted message {index} from conversation {id}", style("✓").green().bold());
    }
    Ok(())
}
