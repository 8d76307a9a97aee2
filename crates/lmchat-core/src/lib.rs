//! Business logic and port traits for lmchat.
//!
//! This crate turns streamed completion fragments into a growing answer,
//! merges imported conversations, and orchestrates chat exchanges. It defines
//! the "ports" (`ConversationRepository`, `ChatTransport`, `TextSource`) that
//! the infrastructure layer implements, and depends only on `lmchat-types` --
//! never on `lmchat-infra` or any database/HTTP crate.

pub mod catalog;
pub mod chat;
pub mod import;
pub mod repository;
pub mod stream;
