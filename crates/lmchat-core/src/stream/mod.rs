//! Incremental response handling.
//!
//! - `parser`: splits raw text into `data:` frames and decodes their fragments
//! - `source`: the cancellable pull-based text source trait
//! - `aggregator`: the read loop that folds fragments into the cumulative answer

pub mod aggregator;
pub mod parser;
pub mod source;

pub use aggregator::{CancelHandle, StreamAggregator};
pub use parser::FrameParser;
pub use source::TextSource;
