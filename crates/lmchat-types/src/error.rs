use thiserror::Error;

use crate::conversation::ConversationId;

/// Errors from conversation store operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("conversation not found")]
    NotFound,

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

/// Errors raised while receiving and aggregating a streamed reply.
#[derive(Debug, Error)]
pub enum StreamError {
    /// No response body, connection failure, non-success status, or a
    /// backend-reported in-band error.
    #[error("transport error: {0}")]
    Transport(String),

    /// A frame payload could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// The exchange was cancelled by the caller.
    #[error("stream cancelled")]
    Cancelled,

    /// The remote end produced the reply but could not store it.
    #[error("remote store failed to persist the reply: {0}")]
    Persistence(RepositoryError),
}

/// Errors from a chat exchange.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The reply streamed completely but could not be persisted.
    #[error("failed to persist conversation: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("conversation {0} already has an exchange in flight")]
    Busy(ConversationId),

    #[error("conversation has not been saved yet")]
    Unsaved,
}

impl ChatError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChatError::Stream(StreamError::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::ConstraintViolation("name 'A' already exists".to_string());
        assert_eq!(err.to_string(), "constraint violation: name 'A' already exists");
    }

    #[test]
    fn test_chat_error_from_stream() {
        let err: ChatError = StreamError::Cancelled.into();
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "stream cancelled");
    }

    #[test]
    fn test_remote_persistence_is_not_transport() {
        let err = StreamError::Persistence(RepositoryError::ConstraintViolation("name 'A' already exists".into()));
        assert!(!matches!(err, StreamError::Transport(_)));
        assert!(err.to_string().contains("name 'A' already exists"));
    }

    #[test]
    fn test_persistence_failure_is_distinct() {
        let err: ChatError = RepositoryError::NotFound.into();
        assert!(!err.is_cancelled());
        assert!(err.to_string().starts_with("failed to persist"));
    }
}
