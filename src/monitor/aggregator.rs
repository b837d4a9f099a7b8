//! Orchestrator that tails a log file and publishes aggregate snapshots.
//!
//! One monitoring run owns a [`TailCursor`], a [`ChangeSource`] and a
//! worker task. The worker is the only consumer of change triggers, and
//! each read-classify-fold-publish cycle holds the cursor lock from start
//! to finish, so cycles never overlap.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use super::publisher::Publisher;
use super::{AggregateSnapshot, MonitorError, MonitorState, StateMachine};
use crate::classify::{fold, fold_text, EventCounts};
use crate::config::MonitorConfig;
use crate::tail::{read_full, TailCursor, TailError};
use crate::watcher::{ChangeEvent, ChangeSource, ChangeStreams};

/// Longest `stop` waits for in-flight work before aborting it.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the snapshot broadcast channel.
pub const SNAPSHOT_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the error broadcast channel.
pub const ERROR_CHANNEL_CAPACITY: usize = 64;

/// State shared between the control surface and the worker.
#[derive(Debug)]
struct Shared {
    state: StateMachine,
    publisher: Publisher,
    config: RwLock<Option<MonitorConfig>>,
}

/// Everything one processing cycle needs.
#[derive(Debug, Clone)]
struct RunContext {
    path: PathBuf,
    cancel: CancellationToken,
    cursor: Arc<Mutex<TailCursor>>,
    shared: Arc<Shared>,
}

impl RunContext {
    /// Consume triggers and source errors until the run is cancelled.
    async fn run(self, mut streams: ChangeStreams) {
        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,
                Some(message) = streams.errors.recv() => {
                    self.shared.publisher.report(&self.cancel, message);
                }
                change = streams.changes.recv() => match change {
                    Some(event) => self.process_change(&event).await,
                    None => break,
                },
            }
        }
        tracing::debug!(path = %self.path.display(), "Worker exited");
    }

    /// One read-classify-fold-publish cycle.
    async fn process_change(&self, event: &ChangeEvent) {
        let mut cursor = self.cursor.lock().await;
        if self.cancel.is_cancelled() {
            return;
        }

        tracing::trace!(kind = ?event.kind, path = %event.path.display(), "Change trigger");

        if !cursor.has_new_content().await {
            return;
        }

        match cursor.read_new_log_lines().await {
            Ok(lines) if lines.is_empty() => {}
            Ok(lines) => {
                let delta = fold(&lines);
                tracing::trace!(
                    lines = lines.len(),
                    last_line = ?lines.last().and_then(|l| l.line_number),
                    ?delta,
                    "Folded new lines"
                );
                self.shared.publisher.apply_delta(&self.cancel, delta);
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Processing cycle failed");
                self.shared.publisher.report(
                    &self.cancel,
                    format!("Failed to read {}: {e}", self.path.display()),
                );
            }
        }
    }

    /// Re-parse the whole file and publish if the totals differ.
    ///
    /// Holds the cursor lock to stay serialized with incremental cycles but
    /// never reads or moves the cursor.
    async fn force_update(&self) -> Result<bool, MonitorError> {
        let _cursor = self.cursor.lock().await;
        if self.cancel.is_cancelled() {
            return Ok(false);
        }

        match read_full(&self.path).await {
            Ok(full) => {
                let snapshot = AggregateSnapshot::from_counts(fold_text(&full.lines));
                Ok(self
                    .shared
                    .publisher
                    .publish_if_changed(&self.cancel, snapshot)
                    .is_some())
            }
            Err(e) if e.is_transient() => {
                tracing::debug!(error = %e, "Forced update skipped, file locked");
                Ok(false)
            }
            Err(e) => {
                self.shared.publisher.report(
                    &self.cancel,
                    format!("Failed to read {}: {e}", self.path.display()),
                );
                Err(e.into())
            }
        }
    }
}

/// Resources of the active monitoring run.
#[derive(Debug)]
struct ActiveRun {
    context: RunContext,
    source: Option<ChangeSource>,
    worker: JoinHandle<()>,
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.context.shared.publisher.close_run(&self.context.cancel);
        self.worker.abort();
    }
}

/// Reverts the state to `Idle` if a start does not complete.
struct StartGuard<'a> {
    state: &'a StateMachine,
    armed: bool,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.transition(MonitorState::Idle);
        }
    }
}

/// Tails one log file and publishes aggregate snapshots on change.
///
/// Lifecycle: `Idle → Starting → Monitoring → Stopping → Idle`.
#[derive(Debug)]
pub struct TailingAggregator {
    shared: Arc<Shared>,
    control: Mutex<Option<ActiveRun>>,
    stop_timeout: Duration,
}

impl Default for TailingAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl TailingAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: StateMachine::new(),
                publisher: Publisher::new(SNAPSHOT_CHANNEL_CAPACITY, ERROR_CHANNEL_CAPACITY),
                config: RwLock::new(None),
            }),
            control: Mutex::new(None),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    /// Set how long `stop` waits for in-flight work.
    #[must_use]
    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        self.shared.state.state()
    }

    /// Watch lifecycle transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<MonitorState> {
        self.shared.state.subscribe()
    }

    /// Configuration of the current or most recent run.
    #[must_use]
    pub fn config(&self) -> Option<MonitorConfig> {
        self.shared
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Most recently published snapshot, if any.
    #[must_use]
    pub fn last_snapshot(&self) -> Option<AggregateSnapshot> {
        self.shared.publisher.last()
    }

    #[must_use]
    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<AggregateSnapshot> {
        self.shared.publisher.subscribe_snapshots()
    }

    #[must_use]
    pub fn subscribe_errors(&self) -> broadcast::Receiver<String> {
        self.shared.publisher.subscribe_errors()
    }

    /// Published snapshots as a stream.
    #[must_use]
    pub fn snapshot_stream(&self) -> BroadcastStream<AggregateSnapshot> {
        BroadcastStream::new(self.subscribe_snapshots())
    }

    /// Published errors as a stream.
    #[must_use]
    pub fn error_stream(&self) -> BroadcastStream<String> {
        BroadcastStream::new(self.subscribe_errors())
    }

    /// Start monitoring with `config`.
    ///
    /// Validates the configuration, positions the cursor, starts the change
    /// source, and publishes a baseline snapshot from a full parse of the
    /// file. Configuration failures are also published on the error channel.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::AlreadyRunning`] if a run is active,
    /// [`MonitorError::Configuration`] for an invalid configuration, and
    /// [`MonitorError::Watcher`] if the change source cannot be created.
    pub async fn start(&self, config: MonitorConfig) -> Result<(), MonitorError> {
        let mut control = self.control.lock().await;
        if control.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }
        self.start_locked(&mut control, config).await
    }

    /// Stop monitoring.
    ///
    /// Idempotent. Once this returns, no further snapshot or error from the
    /// stopped run is published.
    pub async fn stop(&self) {
        let mut control = self.control.lock().await;
        self.stop_locked(&mut control).await;
    }

    /// Replace the configuration: stop, then start with `config`.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`TailingAggregator::start`]; the old run
    /// is stopped either way.
    pub async fn reconfigure(&self, config: MonitorConfig) -> Result<(), MonitorError> {
        let mut control = self.control.lock().await;
        tracing::info!(path = %config.file_path.display(), "Reconfiguring monitor");
        self.stop_locked(&mut control).await;
        self.start_locked(&mut control, config).await
    }

    /// Re-parse the whole file and publish if the totals changed.
    ///
    /// Does not touch the tail cursor. Returns whether a snapshot was
    /// published.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::NotRunning`] when idle and
    /// [`MonitorError::Tail`] if the file cannot be read.
    pub async fn force_update(&self) -> Result<bool, MonitorError> {
        let context = {
            let control = self.control.lock().await;
            control
                .as_ref()
                .map(|run| run.context.clone())
                .ok_or(MonitorError::NotRunning)?
        };
        context.force_update().await
    }

    async fn start_locked(
        &self,
        control: &mut Option<ActiveRun>,
        config: MonitorConfig,
    ) -> Result<(), MonitorError> {
        let publisher = &self.shared.publisher;
        self.shared.state.transition(MonitorState::Starting);
        let mut guard = StartGuard {
            state: &self.shared.state,
            armed: true,
        };

        if let Err(e) = config.validate() {
            tracing::warn!(error = %e, "Rejected monitor configuration");
            publisher.report_unscoped(format!("Invalid configuration: {e}"));
            return Err(e.into());
        }

        *self
            .shared
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(config.clone());

        let cancel = CancellationToken::new();
        let mut cursor = match TailCursor::initialize(&config.file_path, false).await {
            Ok(cursor) => cursor,
            Err(e) => {
                publisher.report_unscoped(e.to_string());
                return Err(e.into());
            }
        };

        let (source, streams) = match ChangeSource::start(&config, cancel.child_token()) {
            Ok(started) => started,
            Err(e) => {
                publisher.report_unscoped(e.to_string());
                return Err(e.into());
            }
        };

        let baseline = self.baseline(&mut cursor, &cancel).await;
        publisher.publish_baseline(&cancel, AggregateSnapshot::from_counts(baseline));

        let context = RunContext {
            path: config.file_path.clone(),
            cancel,
            cursor: Arc::new(Mutex::new(cursor)),
            shared: Arc::clone(&self.shared),
        };
        let worker = tokio::spawn(context.clone().run(streams));

        *control = Some(ActiveRun {
            context,
            source: Some(source),
            worker,
        });

        guard.armed = false;
        self.shared.state.transition(MonitorState::Monitoring);
        tracing::info!(
            path = %config.file_path.display(),
            notifications = config.use_notification_watcher,
            poll_interval_ms = config.poll_interval_ms,
            "Monitoring started"
        );
        Ok(())
    }

    /// Full parse at startup.
    ///
    /// The cursor is moved to where the parse stopped so the first
    /// incremental cycle does not count the same lines again. On a locked
    /// file the cursor stays at the start and the first cycle catches up.
    async fn baseline(&self, cursor: &mut TailCursor, cancel: &CancellationToken) -> EventCounts {
        match read_full(cursor.path()).await {
            Ok(full) => {
                cursor.fast_forward(&full);
                tracing::debug!(
                    lines = full.lines.len(),
                    offset = full.end_offset,
                    "Baseline parsed"
                );
                fold_text(&full.lines)
            }
            Err(e @ TailError::Locked(_)) => {
                tracing::debug!(error = %e, "Baseline deferred, file locked");
                EventCounts::default()
            }
            Err(e) => {
                self.shared.publisher.report(
                    cancel,
                    format!("Failed to read {}: {e}", cursor.path().display()),
                );
                EventCounts::default()
            }
        }
    }

    async fn stop_locked(&self, control: &mut Option<ActiveRun>) {
        let Some(mut run) = control.take() else {
            return;
        };

        self.shared.state.transition(MonitorState::Stopping);
        self.shared.publisher.close_run(&run.context.cancel);

        let source = run.source.take();
        let shutdown = async {
            if let Some(source) = source {
                source.stop().await;
            }
            if let Err(e) = (&mut run.worker).await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "Worker ended abnormally");
                }
            }
        };

        if tokio::time::timeout(self.stop_timeout, shutdown).await.is_err() {
            tracing::warn!(
                timeout_ms = self.stop_timeout.as_millis(),
                "Stop timed out, aborting in-flight work"
            );
        }
        drop(run);

        self.shared.state.transition(MonitorState::Idle);
        tracing::info!("Monitoring stopped");
    }
}

impl Drop for TailingAggregator {
    fn drop(&mut self) {
        if self.control.get_mut().take().is_some() {
            self.shared.state.transition(MonitorState::Idle);
        }
    }
}
