//! Shared domain types for lmchat.
//!
//! Conversations, their generation options and messages, the transient
//! stream frames produced while a reply is being received, configuration,
//! and the error enums shared by every layer.
//!
//! Zero infrastructure dependencies -- only serde and thiserror.

pub mod api;
pub mod config;
pub mod conversation;
pub mod error;
pub mod stream;
