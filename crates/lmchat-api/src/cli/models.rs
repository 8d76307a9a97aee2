//! `lmchat models`: chat-capable models known to the backend.

use anyhow::Result;
use console::style;

use crate::state::AppState;

pub async fn list_models(state: &AppState, json: bool) -> Result<()> {
    let models = state.session.list_models().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    println!();
    if models.is_empty() {
        println!("  {}", style("No chat models loaded.").dim());
    }
    for model in &models {
        println!("  {} {}", style("•").dim(), style(model).cyan());
    }
    println!();
    Ok(())
}
