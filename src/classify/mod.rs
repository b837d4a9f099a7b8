//! Line classification for crash-dump logs.
//!
//! Tags each log line with an [`EventKind`] and reduces batches of lines
//! into [`EventCounts`].

mod classifier;
mod counts;

pub use classifier::{classify, fold, fold_text, EventKind, LogLine};
pub use counts::EventCounts;
