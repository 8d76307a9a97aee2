//! Chat exchanges: one user turn in, one assistant turn out.
//!
//! - `transport`: the "send a conversation, get a readable stream" port
//! - `session`: the orchestrator tying transport, aggregator and store together

pub mod session;
pub mod transport;

pub use session::{ChatSession, ExchangeClaim, ExchangeState};
pub use transport::ChatTransport;
