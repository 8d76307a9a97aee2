//! Line-oriented frame parser for OpenAI-style server-sent events.
//!
//! Each data frame is one line of the form `data: {JSON}` whose payload is a
//! `chat.completion.chunk`; `data: [DONE]` marks the end of the stream.
//! Everything else (blank keep-alive lines, `:` comments, `event:`/`id:`
//! fields) is ignored.
//!
//! The parser keeps the unterminated tail of every chunk and prepends it to
//! the next one, so a frame split across two reads is decoded once, whole.

use lmchat_types::error::StreamError;
use lmchat_types::stream::{CompletionChunk, DONE_SENTINEL, StreamErrorPayload, StreamFrame};

/// Incremental splitter from raw text chunks to [`StreamFrame`]s.
#[derive(Debug, Default)]
pub struct FrameParser {
    pending: String,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of raw text.
    ///
    /// Returns the frames of every line the chunk completes. An unterminated
    /// trailing line is held back until a later chunk (or [`finish`]) ends it.
    ///
    /// [`finish`]: FrameParser::finish
    pub fn push(&mut self, chunk: &str) -> Frames {
        self.pending.push_str(chunk);
        let complete = match self.pending.rfind('\n') {
            Some(idx) => {
                let tail = self.pending.split_off(idx + 1);
                std::mem::replace(&mut self.pending, tail)
            }
            None => String::new(),
        };
        Frames::new(complete)
    }

    /// Flush the held-back tail at end of stream.
    pub fn finish(&mut self) -> Frames {
        Frames::new(std::mem::take(&mut self.pending))
    }

    /// Whether a partial line is waiting for its newline.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Lazy, finite, non-restartable sequence of frames from completed lines.
#[derive(Debug)]
pub struct Frames {
    text: String,
    pos: usize,
}

impl Frames {
    fn new(text: String) -> Self {
        Self { text, pos: 0 }
    }
}

impl Iterator for Frames {
    type Item = Result<StreamFrame, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.text.len() {
            let rest = &self.text[self.pos..];
            let (line, advance) = match rest.find('\n') {
                Some(idx) => (&rest[..idx], idx + 1),
                None => (rest, rest.len()),
            };
            self.pos += advance;

            if let Some(frame) = parse_line(line).transpose() {
                return Some(frame);
            }
        }
        None
    }
}

/// Decode one protocol line.
///
/// `Ok(None)` for lines that carry no frame. A `data:` line with a JSON
/// object that fails to decode is a [`StreamError::Parse`]. An object with a
/// top-level `error` field is a failure relayed in-band: a backend failure
/// becomes [`StreamError::Transport`], and a store failure reported by an
/// `lmchat serve` (an error frame with a `kind`) becomes
/// [`StreamError::Persistence`].
pub fn parse_line(line: &str) -> Result<Option<StreamFrame>, StreamError> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let payload = payload.trim();

    if payload == DONE_SENTINEL {
        return Ok(Some(StreamFrame::Done));
    }
    if !payload.starts_with('{') {
        return Ok(None);
    }

    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| StreamError::Parse(format!("invalid frame payload: {e}")))?;

    if value.get("error").is_some() {
        let reported: StreamErrorPayload = serde_json::from_value(value)
            .map_err(|e| StreamError::Parse(format!("invalid error frame: {e}")))?;
        return Err(reported.into_error());
    }

    let chunk: CompletionChunk = serde_json::from_value(value)
        .map_err(|e| StreamError::Parse(format!("invalid completion chunk: {e}")))?;
    Ok(Some(StreamFrame::Fragment(chunk.fragment().to_string())))
}
