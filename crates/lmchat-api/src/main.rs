//! lmchat CLI and persistence proxy entry point.
//!
//! Binary name: `lmchat`
//!
//! Parses CLI arguments, opens the configured backend, then dispatches to
//! the matching command handler or starts the proxy server.

mod cli;
mod http;
mod state;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use lmchat_infra::config::{load_effective_config, resolve_data_dir};
use lmchat_types::config::BackendKind;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity; RUST_LOG wins when set
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,lmchat=debug,lmchat_core=debug,lmchat_infra=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let data_dir = resolve_data_dir();
    let mut config = load_effective_config(&data_dir).await;

    // The server is the proxy; it always owns the local store
    if matches!(cli.command, Commands::Serve { .. }) && config.backend == BackendKind::Proxy {
        tracing::warn!("Ignoring proxy backend for `serve`; using the local store");
        config.backend = BackendKind::Local;
    }

    let state = AppState::with_config(config, data_dir).await?;

    match cli.command {
        Commands::List => {
            cli::conversation::list_conversations(&state, cli.json).await?;
        }

        Commands::Show { id } => {
            cli::conversation::show_conversation(&state, id, cli.json).await?;
        }

        Commands::Create { name, model, options } => {
            cli::conversation::create_conversation(&state, &name, &model, options.into(), cli.json).await?;
        }

        Commands::Rename { id, name } => {
            cli::conversation::rename_conversation(&state, id, &name, cli.json).await?;
        }

        Commands::Delete { id } => {
            cli::conversation::delete_conversation(&state, id, cli.json).await?;
        }

        Commands::DeleteMessage { id, index } => {
            cli::conversation::delete_message(&state, id, index, cli.json).await?;
        }

        Commands::Chat { id, prompt } => {
            cli::chat::send_prompt(&state, id, prompt.join(" "), cli.json).await?;
        }

        Commands::Models => {
            cli::models::list_models(&state, cli.json).await?;
        }

        Commands::Export { file } => {
            cli::transfer::export(&state, file, cli.json).await?;
        }

        Commands::Import { file } => {
            cli::transfer::import(&state, &file, cli.json).await?;
        }

        Commands::Serve { port, host } => {
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} lmchat proxy listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!(
                "  {} {}",
                console::style("LM Studio:").dim(),
                console::style(&state.config.lm_studio_url).dim()
            );
            println!(
                "  {} {}",
                console::style("Database:").dim(),
                console::style(state.data_dir.join(lmchat_infra::sqlite::pool::DATABASE_FILE).display()).dim()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            println!("\n  Server stopped.");
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
///
/// A handler that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
