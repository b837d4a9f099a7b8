//! Tail error types.

use std::path::PathBuf;

/// Errors that can occur while tailing a file.
#[derive(thiserror::Error, Debug)]
pub enum TailError {
    /// No file path was given.
    #[error("File path must not be empty")]
    EmptyPath,

    /// The writer currently holds a lock that prevents reading.
    #[error("File is locked by another process: {0}")]
    Locked(PathBuf),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TailError {
    /// Whether the next attempt may succeed without intervention.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Locked(_))
    }
}
