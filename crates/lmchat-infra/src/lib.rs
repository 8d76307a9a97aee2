//! Infrastructure layer for lmchat.
//!
//! Contains implementations of the port traits defined in `lmchat-core`:
//! the SQLite conversation store, the LM Studio HTTP transport, the client
//! for an `lmchat serve` proxy, and the [`backend::Backend`] variant that
//! selects between them. Also loads configuration and resolves the data
//! directory.

pub mod backend;
pub mod config;
pub mod llm;
pub mod sqlite;
