//! `lmchat chat`: one exchange streamed to stdout.

use std::io::Write;

use anyhow::Result;
use console::style;

use lmchat_core::repository::ConversationRepository;
use lmchat_types::conversation::ConversationId;

use crate::state::AppState;

/// Send `prompt` to conversation `id` and print the reply as it grows.
///
/// Ctrl+C cancels the exchange. A cancelled or failed exchange leaves the
/// stored conversation unchanged.
pub async fn send_prompt(state: &AppState, id: ConversationId, prompt: String, json: bool) -> Result<()> {
    let mut conversation = state.backend().load(id).await?;

    if !json {
        println!();
        println!("  {} {}", style("you").green().bold(), prompt);
        println!();
        print!("  {} ", style("assistant").cyan().bold());
        std::io::stdout().flush()?;
    }

    let mut printed = 0usize;
    let exchange = state.session.submit(&mut conversation, prompt, |answer: &str| {
        if json || answer.len() <= printed {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "{}", &answer[printed..]);
        let _ = stdout.flush();
        printed = answer.len();
    });
    let mut exchange = std::pin::pin!(exchange);

    let outcome = tokio::select! {
        outcome = &mut exchange => outcome,
        _ = tokio::signal::ctrl_c() => {
            state.session.cancel(id);
            exchange.await
        }
    };

    match outcome {
        Ok(answer) => {
            if json {
                println!("{}", serde_json::json!({ "id": id, "answer": answer }));
            } else {
                println!();
                println!();
            }
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            if json {
                println!("{}", serde_json::json!({ "id": id, "cancelled": true }));
            } else {
                println!();
                println!();
                println!("  {}", style("Cancelled.").yellow());
                println!();
            }
            Ok(())
        }
        Err(e) => {
            if !json {
                println!();
            }
            Err(e.into())
        }
    }
}
