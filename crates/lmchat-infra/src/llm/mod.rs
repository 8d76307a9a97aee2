//! HTTP backends.
//!
//! - `source`: response body as a cancellable [`TextSource`](lmchat_core::stream::TextSource)
//! - `lm_studio`: OpenAI-compatible `/chat/completions` transport
//! - `proxy`: client for an `lmchat serve` instance (store and transport)

pub mod lm_studio;
pub mod proxy;
pub mod source;

use lmchat_types::error::StreamError;

pub use lm_studio::LmStudioTransport;
pub use proxy::ProxyClient;
pub use source::HttpTextSource;

/// Turn a non-success response into a transport error carrying the body.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_body = response.text().await.unwrap_or_default();
    Err(StreamError::Transport(format!("HTTP {status}: {error_body}")))
}
