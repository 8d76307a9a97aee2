//! Chat session orchestrating one exchange at a time per conversation.
//!
//! An exchange walks `Idle -> Sending -> Streaming -> {Completed | Failed |
//! Cancelled}`: the user turn is appended, the transport is asked for a
//! stream, the aggregator folds it into the answer, and the assistant turn is
//! appended and persisted.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lmchat_types::conversation::{Conversation, ConversationId, Message};
use lmchat_types::error::{ChatError, RepositoryError, StreamError};

use crate::chat::transport::ChatTransport;
use crate::repository::ConversationRepository;
use crate::stream::StreamAggregator;

/// Where an exchange currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    Sending,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl ExchangeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct InFlight {
    cancel: CancellationToken,
    state: ExchangeState,
}

/// Exclusive claim on a conversation's exchange slot.
///
/// Returned by [`ChatSession::begin`] and consumed by [`ChatSession::run`].
/// Dropping it, however the exchange ends, frees the slot.
pub struct ExchangeClaim {
    registry: Arc<DashMap<ConversationId, InFlight>>,
    id: ConversationId,
    cancel: CancellationToken,
}

impl ExchangeClaim {
    pub fn id(&self) -> ConversationId {
        self.id
    }

    fn transition(&self, next: ExchangeState) {
        if let Some(mut entry) = self.registry.get_mut(&self.id) {
            debug!(conversation_id = self.id, from = %entry.state, to = %next, "Exchange transition");
            entry.state = next;
        }
    }
}

impl Drop for ExchangeClaim {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

/// Orchestrates exchanges between a transport and a conversation store.
///
/// Generic over `ConversationRepository` and `ChatTransport` so lmchat-core
/// never depends on lmchat-infra.
pub struct ChatSession<R: ConversationRepository, T: ChatTransport> {
    repository: R,
    transport: T,
    in_flight: Arc<DashMap<ConversationId, InFlight>>,
}

impl<R: ConversationRepository, T: ChatTransport> ChatSession<R, T> {
    pub fn new(repository: R, transport: T) -> Self {
        Self {
            repository,
            transport,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// State of the exchange running for `id`, `Idle` when there is none.
    pub fn state(&self, id: ConversationId) -> ExchangeState {
        self.in_flight
            .get(&id)
            .map(|entry| entry.state)
            .unwrap_or(ExchangeState::Idle)
    }

    /// Cancel the exchange running for `id`. Returns `false` if none is.
    pub fn cancel(&self, id: ConversationId) -> bool {
        match self.in_flight.get(&id) {
            Some(entry) => {
                info!(conversation_id = id, state = %entry.state, "Cancelling exchange");
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Claim the exchange slot for `id` without waiting.
    ///
    /// Fails with [`ChatError::Busy`] while another exchange holds it. The
    /// slot counts as `Sending` until the claim is run or dropped.
    pub fn begin(&self, id: ConversationId) -> Result<ExchangeClaim, ChatError> {
        let cancel = CancellationToken::new();
        match self.in_flight.entry(id) {
            Entry::Occupied(_) => return Err(ChatError::Busy(id)),
            Entry::Vacant(slot) => {
                slot.insert(InFlight {
                    cancel: cancel.clone(),
                    state: ExchangeState::Sending,
                });
            }
        }
        Ok(ExchangeClaim {
            registry: Arc::clone(&self.in_flight),
            id,
            cancel,
        })
    }

    /// Run one exchange on `conversation`: [`begin`](Self::begin) then
    /// [`run`](Self::run).
    pub async fn submit<F>(
        &self,
        conversation: &mut Conversation,
        prompt: impl Into<String>,
        on_progress: F,
    ) -> Result<String, ChatError>
    where
        F: FnMut(&str) + Send,
    {
        let id = conversation.id.ok_or(ChatError::Unsaved)?;
        let claim = self.begin(id)?;
        self.run(claim, conversation, prompt, on_progress).await
    }

    /// Run one exchange under `claim` on `conversation`.
    ///
    /// The user turn is appended before anything is sent and stays there on
    /// every outcome. `on_progress` receives the cumulative answer. On
    /// success the assistant turn is appended and the whole record written
    /// with `update`; if that write fails (here, or on a remote store that
    /// reports it in-band) the reply stays in `conversation` and
    /// [`ChatError::Persistence`] is returned.
    ///
    /// `conversation` must be the record `claim` was taken for; otherwise
    /// [`ChatError::Unsaved`] is returned and nothing is sent.
    pub async fn run<F>(
        &self,
        claim: ExchangeClaim,
        conversation: &mut Conversation,
        prompt: impl Into<String>,
        mut on_progress: F,
    ) -> Result<String, ChatError>
    where
        F: FnMut(&str) + Send,
    {
        let id = claim.id;
        if conversation.id != Some(id) {
            return Err(ChatError::Unsaved);
        }

        conversation.messages.push(Message::user(prompt));
        debug!(conversation_id = id, model = %conversation.model, "Sending exchange");

        let sent = tokio::select! {
            biased;
            _ = claim.cancel.cancelled() => Err(StreamError::Cancelled),
            sent = self.transport.send(conversation) => sent,
        };
        let source = match sent {
            Ok(source) => source,
            Err(e) => return Err(Self::abort(&claim, e)),
        };

        claim.transition(ExchangeState::Streaming);
        let mut received = String::new();
        let streamed = StreamAggregator::with_cancellation(source, claim.cancel.clone())
            .run(|answer| {
                received.clear();
                received.push_str(answer);
                on_progress(answer);
            })
            .await;
        let answer = match streamed {
            Ok(answer) => answer,
            Err(StreamError::Persistence(e)) => {
                conversation.messages.push(Message::assistant(received));
                return Err(Self::persistence_failed(&claim, e));
            }
            Err(e) => return Err(Self::abort(&claim, e)),
        };

        conversation.messages.push(Message::assistant(answer.clone()));
        if let Err(e) = self.repository.update(conversation).await {
            return Err(Self::persistence_failed(&claim, e));
        }
        claim.transition(ExchangeState::Completed);

        info!(conversation_id = id, len = answer.len(), "Exchange completed");
        Ok(answer)
    }

    fn abort(claim: &ExchangeClaim, error: StreamError) -> ChatError {
        if matches!(error, StreamError::Cancelled) {
            claim.transition(ExchangeState::Cancelled);
            info!(conversation_id = claim.id, "Exchange cancelled");
        } else {
            claim.transition(ExchangeState::Failed);
            warn!(conversation_id = claim.id, error = %error, "Exchange failed");
        }
        ChatError::Stream(error)
    }

    fn persistence_failed(claim: &ExchangeClaim, error: RepositoryError) -> ChatError {
        claim.transition(ExchangeState::Failed);
        warn!(conversation_id = claim.id, error = %error, "Failed to persist completed exchange");
        ChatError::Persistence(error)
    }

    /// Model identifiers offered by the transport.
    pub async fn list_models(&self) -> Result<Vec<String>, StreamError> {
        self.transport.list_models().await
    }
}
