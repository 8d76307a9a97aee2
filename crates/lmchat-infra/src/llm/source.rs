//! HTTP response bodies as text sources.

use std::pin::Pin;

use futures_util::{Stream, StreamExt};

use lmchat_core::stream::TextSource;
use lmchat_types::error::StreamError;
use lmchat_types::stream::{CompletionResponse, StreamFrame};

/// Raw body chunks, already mapped to [`StreamError`].
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, StreamError>> + Send>>;

/// A response body decoded to UTF-8 text as it arrives.
///
/// A multi-byte character split across network chunks is held back until it
/// is complete. Dropping the source drops the body and with it the
/// connection.
pub struct HttpTextSource {
    body: Option<ByteStream>,
    pending: Vec<u8>,
    cancelled: bool,
}

impl HttpTextSource {
    pub fn new(body: ByteStream) -> Self {
        Self {
            body: Some(body),
            pending: Vec::new(),
            cancelled: false,
        }
    }

    /// Stream an event-stream response body as it arrives.
    pub fn from_response(response: reqwest::Response) -> Self {
        let body = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| StreamError::Transport(format!("failed to read response body: {e}")))
        });
        Self::new(Box::pin(body))
    }

    /// Present a non-incremental `chat.completion` response as one fragment
    /// frame followed by the sentinel.
    pub fn from_completion(response: reqwest::Response) -> Self {
        let body = async_stream::stream! {
            let frames: Result<Vec<u8>, StreamError> = match response.json::<CompletionResponse>().await {
                Ok(completion) => {
                    let fragment = StreamFrame::Fragment(completion.content().to_string());
                    Ok(format!("{}{}", fragment.to_line(), StreamFrame::Done.to_line()).into_bytes())
                }
                Err(e) if e.is_decode() => {
                    Err(StreamError::Parse(format!("invalid completion response: {e}")))
                }
                Err(e) => Err(StreamError::Transport(format!("failed to read response body: {e}"))),
            };
            yield frames;
        };
        Self::new(Box::pin(body))
    }

    /// Split off the longest complete UTF-8 prefix of `pending`.
    ///
    /// An unfinished character at the end is kept for the next chunk; any
    /// other invalid byte is a parse error.
    fn take_text(&mut self) -> Result<Option<String>, StreamError> {
        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                return Err(StreamError::Parse(format!(
                    "invalid UTF-8 in response body at byte {}",
                    e.valid_up_to()
                )));
            }
        };
        if complete == 0 {
            return Ok(None);
        }
        let rest = self.pending.split_off(complete);
        let bytes = std::mem::replace(&mut self.pending, rest);
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| StreamError::Parse(format!("invalid UTF-8 in response body: {e}")))
    }
}

impl TextSource for HttpTextSource {
    async fn read(&mut self) -> Result<Option<String>, StreamError> {
        loop {
            if self.cancelled {
                return Err(StreamError::Cancelled);
            }
            let next = match self.body.as_mut() {
                Some(body) => body.next().await,
                None => return Ok(None),
            };

            match next {
                Some(Ok(bytes)) => {
                    self.pending.extend_from_slice(&bytes);
                    match self.take_text() {
                        Ok(Some(text)) => return Ok(Some(text)),
                        Ok(None) => {}
                        Err(e) => {
                            self.body = None;
                            self.pending.clear();
                            return Err(e);
                        }
                    }
                }
                Some(Err(e)) => {
                    self.body = None;
                    return Err(e);
                }
                None => {
                    self.body = None;
                    if self.pending.is_empty() {
                        return Ok(None);
                    }
                    self.pending.clear();
                    return Err(StreamError::Parse(
                        "invalid UTF-8 in response body: truncated character at end of stream".into(),
                    ));
                }
            }
        }
    }

    fn cancel(&mut self) {
        self.cancelled = true;
        self.body = None;
        self.pending.clear();
    }
}
