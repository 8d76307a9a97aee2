//! Persistence proxy server (`lmchat serve`).
//!
//! Serves the conversation store and relays LM Studio completions over the
//! JSON + event-stream dialect defined in `lmchat_types::api`.

pub mod error;
pub mod handlers;
pub mod router;
