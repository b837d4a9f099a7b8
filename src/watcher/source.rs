//! Strategy selection for change detection.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::error::WatcherError;
use super::{change_channel, ChangeStreams, IntervalSource, NotifySource, RestartPolicy};
use crate::config::MonitorConfig;

/// Which strategy a [`ChangeSource`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Notify,
    Interval,
}

/// The change source active for one monitoring run.
///
/// Chosen once from [`MonitorConfig::use_notification_watcher`] when the
/// run starts.
#[derive(Debug)]
pub enum ChangeSource {
    Notify(NotifySource),
    Interval(IntervalSource),
}

impl ChangeSource {
    /// Start the strategy selected by `config`.
    ///
    /// Returns the running source and the streams it feeds. The source stops
    /// when `cancel` fires or [`ChangeSource::stop`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::InvalidPath`] if notifications are requested
    /// for a path without a file name.
    pub fn start(
        config: &MonitorConfig,
        cancel: CancellationToken,
    ) -> Result<(Self, ChangeStreams), WatcherError> {
        let (sink, streams) = change_channel();
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        let source = if config.use_notification_watcher {
            Self::Notify(NotifySource::spawn(
                &config.file_path,
                poll_interval,
                RestartPolicy::from_config(config),
                sink,
                cancel,
            )?)
        } else {
            Self::Interval(IntervalSource::spawn(
                config.file_path.clone(),
                poll_interval,
                sink,
                cancel,
            ))
        };

        tracing::debug!(
            kind = ?source.kind(),
            path = %config.file_path.display(),
            "Change source started"
        );
        Ok((source, streams))
    }

    #[must_use]
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Notify(_) => SourceKind::Notify,
            Self::Interval(_) => SourceKind::Interval,
        }
    }

    /// Stop the source and release its task.
    pub async fn stop(self) {
        match self {
            Self::Notify(source) => source.stop().await,
            Self::Interval(source) => source.stop().await,
        }
    }
}
