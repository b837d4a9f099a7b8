//! Watcher error types.

use std::path::PathBuf;

/// Errors that can occur during file watching.
#[derive(thiserror::Error, Debug)]
pub enum WatcherError {
    /// The watched path has no file name component.
    #[error("Cannot watch path without a file name: {0}")]
    InvalidPath(PathBuf),

    /// Notify watcher error.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),
}
