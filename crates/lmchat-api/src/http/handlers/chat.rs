//! Conversation endpoints.
//!
//! - `GET /chats`: summaries of every stored conversation
//! - `GET /chat?id=`: one full record
//! - `POST /chat`: create (optionally with a message history)
//! - `PATCH /chat`: replace a full record
//! - `PUT /chat`: append a user message and stream the reply as SSE
//! - `DELETE /chat?id=`: delete a conversation
//! - `DELETE /chat/message`: drop one message by index
//! - `POST /chat/cancel?id=`: cancel the exchange in flight
//!
//! The `PUT /chat` stream relays `data:` frames in the completion chunk
//! shape, ends with `data: [DONE]`, and reports failures in-band as
//! `data: {"error": "..."}`. A reply that arrived but could not be stored
//! adds `"kind"` (`not_found`, `constraint_violation` or `persistence`).

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::{debug, info};

use lmchat_core::repository::{ConversationRepository, ImportTransaction};
use lmchat_types::api::{
    Ack, ChatList, ChatRecord, CreateChat, Created, DeleteMessage, Envelope, IdQuery, SendMessage,
};
use lmchat_types::conversation::{Conversation, MessageRole};
use lmchat_types::error::ChatError;
use lmchat_types::stream::{StreamErrorPayload, StreamFrame};

use crate::http::error::AppError;
use crate::state::AppState;

/// GET /chats
pub async fn list_chats(State(state): State<AppState>) -> Result<Json<Envelope<ChatList>>, AppError> {
    let chats = state.catalog.summaries().await?;
    Ok(Json(Envelope::success(ChatList { chats })))
}

/// GET /chat?id=
pub async fn get_chat(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<Envelope<ChatRecord>>, AppError> {
    let chat = state.backend().load(query.id).await?;
    Ok(Json(Envelope::success(ChatRecord { chat })))
}

/// POST /chat
///
/// A body carrying `messages` is written as one full record, so an
/// imported conversation never exists without its history.
pub async fn create_chat(
    State(state): State<AppState>,
    Json(body): Json<CreateChat>,
) -> Result<Json<Envelope<Created>>, AppError> {
    if body.name.trim().is_empty() {
        return Err(AppError::Validation("Missing chat name".to_string()));
    }
    if body.model.trim().is_empty() {
        return Err(AppError::Validation("Missing model".to_string()));
    }

    let id = if body.messages.is_empty() {
        state.catalog.create(&body.name, &body.model, &body.overrides).await?
    } else {
        let mut conversation = Conversation::new(&body.name, &body.model, &body.overrides);
        conversation.messages = body.messages;
        let mut batch = state.backend().begin_import().await?;
        let id = batch.insert(&conversation).await?;
        batch.commit().await?;
        state.catalog.invalidate().await;
        id
    };

    info!(chat_id = id, name = %body.name, "Chat created");
    Ok(Json(Envelope::success(Created { id })))
}

/// PATCH /chat
pub async fn update_chat(
    State(state): State<AppState>,
    Json(conversation): Json<Conversation>,
) -> Result<Json<Envelope<Ack>>, AppError> {
    let id = conversation
        .id
        .ok_or_else(|| AppError::Validation("Missing chat id".to_string()))?;
    if conversation.name.trim().is_empty() {
        return Err(AppError::Validation("Missing chat name".to_string()));
    }

    state.backend().update(&conversation).await?;
    state.catalog.invalidate().await;

    debug!(chat_id = id, messages = conversation.messages.len(), "Chat updated");
    Ok(Json(Envelope::success(Ack {
        message: format!("Chat {id} updated"),
    })))
}

/// DELETE /chat?id=
pub async fn delete_chat(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<Envelope<Ack>>, AppError> {
    state.session.cancel(query.id);
    state.catalog.delete(query.id).await?;
    Ok(Json(Envelope::success(Ack {
        message: format!("Chat {} deleted", query.id),
    })))
}

/// DELETE /chat/message
pub async fn delete_message(
    State(state): State<AppState>,
    Json(body): Json<DeleteMessage>,
) -> Result<Json<Envelope<Ack>>, AppError> {
    let mut conversation = state.backend().load(body.id).await?;
    if body.index >= conversation.messages.len() {
        return Err(AppError::Validation(format!("Invalid message index {}", body.index)));
    }

    conversation.messages.remove(body.index);
    state.backend().update(&conversation).await?;
    Ok(Json(Envelope::success(Ack {
        message: format!("Message {} deleted", body.index),
    })))
}

/// POST /chat/cancel?id=
pub async fn cancel_chat(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<Envelope<Ack>>, AppError> {
    if !state.session.cancel(query.id) {
        return Err(AppError::NotFound(format!(
            "No exchange in flight for chat {}",
            query.id
        )));
    }
    Ok(Json(Envelope::success(Ack {
        message: "Cancellation requested".to_string(),
    })))
}

/// PUT /chat
///
/// The exchange slot is claimed before the stream opens, so a conversation
/// that already has one in flight gets a 409 instead of a stream. The
/// exchange then runs on its own task and feeds the response through a
/// channel. A client that disconnects closes the channel, which drops the
/// exchange and with it the upstream request.
pub async fn send_message(
    State(state): State<AppState>,
    Json(body): Json<SendMessage>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if body.message.role != MessageRole::User {
        return Err(AppError::Validation(format!(
            "Only user messages can be sent, got '{}'",
            body.message.role
        )));
    }
    let claim = state.session.begin(body.id)?;
    let conversation = state.backend().load(body.id).await?;

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let session = state.session.clone();
    let prompt = body.message.content;
    let id = body.id;

    tokio::spawn(async move {
        let mut conversation = conversation;
        let progress_tx = tx.clone();
        let mut relayed = 0usize;
        let exchange = session.run(claim, &mut conversation, prompt, move |answer: &str| {
            if answer.len() > relayed {
                let _ = progress_tx.send(StreamFrame::Fragment(answer[relayed..].to_string()).payload());
                relayed = answer.len();
            }
        });

        let outcome = tokio::select! {
            outcome = exchange => outcome,
            _ = tx.closed() => {
                info!(chat_id = id, "Client disconnected, exchange dropped");
                return;
            }
        };

        let _ = tx.send(closing_payload(outcome));
    });

    let stream = async_stream::stream! {
        while let Some(payload) = rx.recv().await {
            yield Ok::<_, Infallible>(Event::default().data(payload));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

/// Last `data:` payload of a `PUT /chat` stream.
///
/// A store failure after a complete reply carries its `kind` so the client
/// can tell it from an LM Studio failure.
fn closing_payload(outcome: Result<String, ChatError>) -> String {
    match outcome {
        Ok(_) => StreamFrame::Done.payload(),
        Err(ChatError::Persistence(e)) => StreamErrorPayload::persistence(&e).payload(),
        Err(ChatError::Stream(e)) => StreamErrorPayload::new(format!("LM Studio error: {e}")).payload(),
        Err(e) => StreamErrorPayload::new(e.to_string()).payload(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lmchat_types::error::{RepositoryError, StreamError};

    #[test]
    fn test_closing_payload_per_outcome() {
        assert_eq!(closing_payload(Ok("hi".into())), "[DONE]");

        let upstream = closing_payload(Err(ChatError::Stream(StreamError::Transport("refused".into()))));
        let upstream: StreamErrorPayload = serde_json::from_str(&upstream).unwrap();
        assert!(upstream.kind.is_none());
        assert!(upstream.message().starts_with("LM Studio error:"));

        let store = closing_payload(Err(ChatError::Persistence(RepositoryError::ConstraintViolation(
            "name 'A' already exists".into(),
        ))));
        let store: StreamErrorPayload = serde_json::from_str(&store).unwrap();
        assert_eq!(store.message(), "name 'A' already exists");
        assert!(matches!(
            store.into_error(),
            StreamError::Persistence(RepositoryError::ConstraintViolation(_))
        ));
    }
}
