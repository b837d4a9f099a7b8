//! Monitor error types.

use crate::config::ConfigError;
use crate::tail::TailError;
use crate::watcher::WatcherError;

/// Errors returned by the aggregator's control surface.
#[derive(thiserror::Error, Debug)]
pub enum MonitorError {
    /// The configuration cannot start a run.
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    /// `start` was called while a run is active.
    #[error("Monitoring is already running")]
    AlreadyRunning,

    /// The operation needs an active run.
    #[error("Monitoring is not running")]
    NotRunning,

    /// Reading the log file failed.
    #[error("Tail error: {0}")]
    Tail(#[from] TailError),

    /// The change source could not be started.
    #[error("Watcher error: {0}")]
    Watcher(#[from] WatcherError),
}
