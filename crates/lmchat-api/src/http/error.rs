//! Application error type mapping to HTTP status codes and the
//! `{"status": "error", "message": ...}` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use lmchat_types::api::ErrorBody;
use lmchat_types::error::{ChatError, RepositoryError, StreamError};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Conversation store errors.
    Repository(RepositoryError),
    /// Errors from starting or running an exchange.
    Chat(ChatError),
    /// LM Studio could not be reached or answered badly.
    Upstream(StreamError),
    /// Nothing matched the request, with a specific message.
    NotFound(String),
    /// Malformed or invalid request.
    Validation(String),
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Repository(e)
    }
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        AppError::Chat(e)
    }
}

impl From<StreamError> for AppError {
    fn from(e: StreamError) -> Self {
        AppError::Upstream(e)
    }
}

fn repository_status(e: &RepositoryError) -> StatusCode {
    match e {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::ConstraintViolation(_) => StatusCode::CONFLICT,
        RepositoryError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Repository(e) => repository_status(e),
            AppError::Chat(ChatError::Busy(_)) => StatusCode::CONFLICT,
            AppError::Chat(ChatError::Unsaved) => StatusCode::BAD_REQUEST,
            AppError::Chat(ChatError::Persistence(e)) => repository_status(e),
            AppError::Chat(ChatError::Stream(StreamError::Cancelled)) => StatusCode::CONFLICT,
            AppError::Chat(ChatError::Stream(_)) => StatusCode::BAD_GATEWAY,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn message(&self) -> String {
        match self {
            AppError::Repository(RepositoryError::NotFound) => "Chat not found".to_string(),
            AppError::Repository(RepositoryError::ConstraintViolation(msg)) => msg.clone(),
            AppError::Repository(e) => e.to_string(),
            AppError::Chat(e) => e.to_string(),
            AppError::Upstream(e) => format!("LM Studio error: {e}"),
            AppError::NotFound(msg) | AppError::Validation(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            tracing::error!(status = %status, "{message}");
        } else {
            tracing::debug!(status = %status, "{message}");
        }
        (status, Json(ErrorBody::new(message))).into_response()
    }
}
