//! TextSource trait definition.

use lmchat_types::error::StreamError;

/// A cancellable, pull-based reader of response text.
///
/// Implementations live in lmchat-infra (an HTTP body decoded to UTF-8) and
/// in tests (scripted sources). Uses native async fn in traits (RPITIT).
///
/// Dropping a source releases whatever it holds (connection, buffers).
/// [`StreamAggregator`](super::StreamAggregator) owns its source, so the
/// release happens exactly once per aggregation, on every exit path.
pub trait TextSource: Send {
    /// Suspend until more text is available.
    ///
    /// Returns `Ok(None)` at end of stream.
    fn read(
        &mut self,
    ) -> impl std::future::Future<Output = Result<Option<String>, StreamError>> + Send;

    /// Abort the underlying transfer. Later reads must fail or end promptly.
    fn cancel(&mut self);
}
