//! Stream aggregation: from a [`TextSource`] to one cumulative answer.
//!
//! The aggregator suspends on `read()`, parses each chunk into frames,
//! appends the chunk's fragments to the running answer, and reports the
//! full answer-so-far through a progress callback (once per chunk that
//! carried at least one fragment). It resolves at the sentinel frame or at
//! end of stream, and rejects on the first parse/transport error or on
//! cancellation.

use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use lmchat_types::error::StreamError;
use lmchat_types::stream::StreamFrame;

use super::parser::{FrameParser, Frames};
use super::source::TextSource;

/// Cancels the aggregation it was taken from.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl From<CancellationToken> for CancelHandle {
    fn from(token: CancellationToken) -> Self {
        Self { token }
    }
}

/// Folds the frames of one response into the cumulative answer.
pub struct StreamAggregator<S: TextSource> {
    source: S,
    parser: FrameParser,
    cancel: CancellationToken,
    answer: String,
}

impl<S: TextSource> StreamAggregator<S> {
    pub fn new(source: S) -> Self {
        Self::with_cancellation(source, CancellationToken::new())
    }

    /// Aggregate under an externally owned token (e.g. a child of a
    /// per-conversation token).
    pub fn with_cancellation(source: S, cancel: CancellationToken) -> Self {
        Self {
            source,
            parser: FrameParser::new(),
            cancel,
            answer: String::new(),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::from(self.cancel.clone())
    }

    /// Drive the read loop to completion.
    ///
    /// `on_progress` receives the cumulative answer, never a delta. Calls are
    /// sequential and stop at the first error. The source is dropped (and
    /// thereby released) when this future completes or is dropped.
    pub async fn run<F>(mut self, mut on_progress: F) -> Result<String, StreamError>
    where
        F: FnMut(&str) + Send,
    {
        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                read = self.source.read() => Some(read),
            };

            let Some(read) = read else {
                debug!(received = self.answer.len(), "Aggregation cancelled");
                self.source.cancel();
                return Err(StreamError::Cancelled);
            };

            let frames = match read {
                Ok(Some(text)) => self.parser.push(&text),
                Ok(None) => {
                    let frames = self.parser.finish();
                    self.absorb(frames, &mut on_progress)?;
                    debug!(len = self.answer.len(), "Stream ended");
                    return Ok(std::mem::take(&mut self.answer));
                }
                Err(e) => {
                    warn!(error = %e, "Stream read failed");
                    return Err(e);
                }
            };

            if self.absorb(frames, &mut on_progress)? {
                debug!(len = self.answer.len(), "Sentinel frame received");
                return Ok(std::mem::take(&mut self.answer));
            }
        }
    }

    /// Apply the fragments of one chunk. Returns `true` once the sentinel is
    /// seen; frames after it are not applied.
    fn absorb<F>(&mut self, frames: Frames, on_progress: &mut F) -> Result<bool, StreamError>
    where
        F: FnMut(&str),
    {
        let mut delta = String::new();
        let mut saw_fragment = false;
        let mut done = false;

        for frame in frames {
            match frame? {
                StreamFrame::Fragment(fragment) => {
                    delta.push_str(&fragment);
                    saw_fragment = true;
                }
                StreamFrame::Done => {
                    done = true;
                    break;
                }
            }
        }

        if saw_fragment {
            self.answer.push_str(&delta);
            on_progress(&self.answer);
        }
        Ok(done)
    }
}

/// Start aggregating `source`, returning the cancel capability alongside the
/// completion future.
pub fn aggregate<S, F>(
    source: S,
    on_progress: F,
) -> (CancelHandle, impl Future<Output = Result<String, StreamError>>)
where
    S: TextSource,
    F: FnMut(&str) + Send,
{
    let aggregator = StreamAggregator::new(source);
    let handle = aggregator.cancel_handle();
    (handle, aggregator.run(on_progress))
}
