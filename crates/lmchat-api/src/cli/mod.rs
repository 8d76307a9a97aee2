//! CLI command definitions for the `lmchat` binary.
//!
//! Uses clap derive macros for argument parsing. Commands act on the backend
//! selected in `config.toml` (or `LMCHAT_BACKEND`): the local store plus
//! LM Studio, or a remote `lmchat serve` proxy.

pub mod chat;
pub mod conversation;
pub mod models;
pub mod transfer;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use lmchat_types::conversation::{ConversationId, OptionOverrides};

/// Chat with local LM Studio models and keep the history.
#[derive(Parser)]
#[command(name = "lmchat", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List stored conversations.
    #[command(alias = "ls")]
    List,

    /// Show a conversation with its options and messages.
    Show {
        /// Conversation id.
        id: ConversationId,
    },

    /// Create an empty conversation.
    Create {
        /// Unique conversation name.
        name: String,

        /// Model identifier as listed by `lmchat models`.
        #[arg(long, short)]
        model: String,

        #[command(flatten)]
        options: OptionArgs,
    },

    /// Rename a conversation.
    Rename {
        id: ConversationId,
        name: String,
    },

    /// Delete a conversation.
    #[command(alias = "rm")]
    Delete {
        id: ConversationId,
    },

    /// Remove one message from a conversation by its position.
    DeleteMessage {
        id: ConversationId,
        /// Zero-based message index.
        index: usize,
    },

    /// Send a prompt and stream the reply (Ctrl+C cancels).
    Chat {
        id: ConversationId,
        /// Prompt text; multiple words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },

    /// List chat-capable models.
    Models,

    /// Write every conversation as a JSON array.
    Export {
        /// Output file (stdout when omitted).
        file: Option<PathBuf>,
    },

    /// Merge conversations from a JSON array written by `export`.
    Import {
        file: PathBuf,
    },

    /// Start the persistence proxy server.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

/// Generation options for `create`. Unset flags take the defaults.
#[derive(clap::Args)]
pub struct OptionArgs {
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Maximum tokens to generate (-1 for no limit).
    #[arg(long, allow_hyphen_values = true)]
    pub max_tokens: Option<i64>,

    #[arg(long)]
    pub top_k: Option<i64>,

    #[arg(long)]
    pub top_p: Option<f64>,

    #[arg(long)]
    pub repeat_penalty: Option<f64>,

    /// Request the whole reply at once instead of streaming it.
    #[arg(long)]
    pub no_stream: bool,
}

impl From<OptionArgs> for OptionOverrides {
    fn from(args: OptionArgs) -> Self {
        OptionOverrides {
            temperature: args.temperature,
            max_tokens: args.max_tokens,
            top_k: args.top_k,
            top_p: args.top_p,
            repeat_penalty: args.repeat_penalty,
            stream: args.no_stream.then_some(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        <Cli as clap::CommandFactory>::command().debug_assert();
    }

    #[test]
    fn test_create_flags_become_overrides() {
        let cli = Cli::parse_from([
            "lmchat", "create", "Notes", "--model", "qwen", "--temperature", "0.3", "--max-tokens", "-1",
            "--no-stream",
        ]);
        let Commands::Create { name, model, options } = cli.command else {
            panic!("expected create");
        };
        assert_eq!(name, "Notes");
        assert_eq!(model, "qwen");
        let overrides = OptionOverrides::from(options);
        assert_eq!(overrides.temperature, Some(0.3));
        assert_eq!(overrides.max_tokens, Some(-1));
        assert_eq!(overrides.top_k, None);
        assert_eq!(overrides.stream, Some(false));
    }

    #[test]
    fn test_chat_joins_prompt_words() {
        let cli = Cli::parse_from(["lmchat", "--json", "chat", "4", "say", "hello"]);
        assert!(cli.json);
        let Commands::Chat { id, prompt } = cli.command else {
            panic!("expected chat");
        };
        assert_eq!(id, 4);
        assert_eq!(prompt.join(" "), "say hello");
    }
}
