//! Incremental tailing of a growing log file.
//!
//! Tracks a byte offset into one file and yields only the lines appended
//! since the previous read.

mod cursor;
mod error;
mod reader;

pub use cursor::{TailCursor, TailState};
pub use error::TailError;
pub use reader::{read_full, FullRead};
