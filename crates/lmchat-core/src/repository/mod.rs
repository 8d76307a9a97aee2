//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (lmchat-infra) implements. The core crate never depends on any specific
//! storage technology; `memory` is a plain in-process implementation.

pub mod conversation;
pub mod memory;

pub use conversation::{ConversationRepository, ImportTransaction};
pub use memory::InMemoryConversationRepository;
