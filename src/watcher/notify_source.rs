//! OS-notification change source with supervised restarts.
//!
//! Watches the parent directory of the log file non-recursively and
//! filters events down to the one file name. When the underlying watcher
//! fails it is torn down, the failure is reported, and a new watcher is
//! created after a fixed delay. Every time a watcher becomes active one
//! trigger is sent, so writes made while no watcher was registered are
//! still picked up.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_full::{
    new_debouncer,
    notify::{RecommendedWatcher, RecursiveMode},
    DebounceEventResult, Debouncer, RecommendedCache,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::WatcherError;
use super::interval::run_interval;
use super::{ChangeEvent, ChangeSink};
use crate::config::MonitorConfig;

/// Debounce window applied to raw notify events.
pub const DEBOUNCE_TIMEOUT: Duration = Duration::from_millis(100);

/// How a failed watcher is restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Delay before each restart attempt.
    pub delay: Duration,
    /// Consecutive failed creations tolerated before falling back to polling.
    pub max_attempts: u32,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

impl RestartPolicy {
    #[must_use]
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.watcher_restart_delay_ms),
            max_attempts: config.watcher_max_restarts,
        }
    }
}

/// Directory to watch and the file name to filter on.
#[derive(Debug, Clone)]
struct WatchTarget {
    path: PathBuf,
    dir: PathBuf,
    file_name: OsString,
}

impl WatchTarget {
    fn new(path: &Path) -> Result<Self, WatcherError> {
        let file_name = path
            .file_name()
            .ok_or_else(|| WatcherError::InvalidPath(path.to_path_buf()))?
            .to_os_string();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(Self {
            path: path.to_path_buf(),
            dir,
            file_name,
        })
    }
}

/// Change source backed by filesystem notifications.
#[derive(Debug)]
pub struct NotifySource {
    path: PathBuf,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl NotifySource {
    /// Start watching `path`.
    ///
    /// Watcher creation happens on the spawned supervisor task, so failures
    /// are reported through `sink` rather than returned here.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::InvalidPath`] if `path` has no file name.
    pub fn spawn(
        path: &Path,
        poll_interval: Duration,
        policy: RestartPolicy,
        sink: ChangeSink,
        cancel: CancellationToken,
    ) -> Result<Self, WatcherError> {
        let target = WatchTarget::new(path)?;
        let handle = tokio::spawn(supervise(
            target,
            poll_interval,
            policy,
            sink,
            cancel.clone(),
        ));
        Ok(Self {
            path: path.to_path_buf(),
            cancel,
            handle,
        })
    }

    /// Get the path being watched.
    #[must_use]
    pub fn watch_path(&self) -> &Path {
        &self.path
    }

    /// Stop watching and wait for the supervisor task to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Watcher supervisor ended abnormally");
        }
    }
}

type FaultSender = mpsc::UnboundedSender<Vec<notify::Error>>;
type FaultReceiver = mpsc::UnboundedReceiver<Vec<notify::Error>>;

/// Keep a debounced watcher alive, restarting it after failures.
async fn supervise(
    target: WatchTarget,
    poll_interval: Duration,
    policy: RestartPolicy,
    sink: ChangeSink,
    cancel: CancellationToken,
) {
    supervise_with(target, poll_interval, policy, sink, cancel, start_debouncer).await;
}

/// Supervision loop over any watcher built by `start_watcher`.
///
/// The watcher value is held until it reports a fault through the sender
/// it was given, then dropped and rebuilt after `policy.delay`.
async fn supervise_with<W, F>(
    target: WatchTarget,
    poll_interval: Duration,
    policy: RestartPolicy,
    sink: ChangeSink,
    cancel: CancellationToken,
    mut start_watcher: F,
) where
    F: FnMut(&WatchTarget, ChangeSink, FaultSender) -> Result<W, WatcherError>,
{
    let mut failures: u32 = 0;

    loop {
        let (fault_tx, fault_rx) = mpsc::unbounded_channel();

        match start_watcher(&target, sink.clone(), fault_tx) {
            Ok(watcher) => {
                failures = 0;
                tracing::debug!(
                    dir = %target.dir.display(),
                    file = ?target.file_name,
                    "File watcher active"
                );

                // Writes before registration produced no event.
                sink.signal(ChangeEvent::modified(target.path.clone()));

                if !hold_until_fault(watcher, fault_rx, &sink, &cancel).await {
                    return;
                }
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                sink.report(e.to_string());

                if failures > policy.max_attempts {
                    sink.report(format!(
                        "File watcher failed {failures} times in a row, \
                         falling back to polling every {}ms",
                        poll_interval.as_millis()
                    ));
                    run_interval(target.path, poll_interval, sink, cancel).await;
                    return;
                }
            }
        }

        if sink.is_closed() {
            return;
        }

        tracing::warn!(
            path = %target.path.display(),
            delay_ms = policy.delay.as_millis(),
            attempt = failures,
            "Restarting file watcher"
        );

        tokio::select! {
            biased;

            () = cancel.cancelled() => return,
            () = tokio::time::sleep(policy.delay) => {}
        }
    }
}

/// Keep `watcher` alive until it faults or `cancel` fires.
///
/// Returns `false` when cancelled.
async fn hold_until_fault<W>(
    watcher: W,
    mut fault_rx: FaultReceiver,
    sink: &ChangeSink,
    cancel: &CancellationToken,
) -> bool {
    let fault = tokio::select! {
        biased;

        () = cancel.cancelled() => return false,
        fault = fault_rx.recv() => fault,
    };
    drop(watcher);

    match fault {
        Some(errors) if !errors.is_empty() => {
            for error in errors {
                sink.report(WatcherError::Notify(error).to_string());
            }
        }
        _ => sink.report("File watcher stopped unexpectedly"),
    }
    true
}

/// Create a debounced watcher on the target's directory.
///
/// Matching events go straight to `sink`; watcher errors go to `fault_tx`.
fn start_debouncer(
    target: &WatchTarget,
    sink: ChangeSink,
    fault_tx: FaultSender,
) -> Result<Debouncer<RecommendedWatcher, RecommendedCache>, WatcherError> {
    let file_name = target.file_name.clone();

    let mut debouncer = new_debouncer(
        DEBOUNCE_TIMEOUT,
        None,
        move |result: DebounceEventResult| match result {
            Ok(events) => {
                for event in &events {
                    if let Some(change) = ChangeEvent::from_notify(event, &file_name) {
                        sink.signal(change);
                    }
                }
            }
            Err(errors) => {
                let _ = fault_tx.send(errors);
            }
        },
    )?;

    debouncer.watch(&target.dir, RecursiveMode::NonRecursive)?;

    Ok(debouncer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::{change_channel, ChangeKind};
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[test]
    fn test_watch_target_splits_path() {
        let target = WatchTarget::new(Path::new("/logs/game.log")).unwrap();
        assert_eq!(target.dir, PathBuf::from("/logs"));
        assert_eq!(target.file_name, OsString::from("game.log"));
    }

    #[test]
    fn test_watch_target_relative_file() {
        let target = WatchTarget::new(Path::new("game.log")).unwrap();
        assert_eq!(target.dir, PathBuf::from("."));
    }

    #[test]
    fn test_watch_target_rejects_root() {
        let result = WatchTarget::new(Path::new("/"));
        assert!(matches!(result, Err(WatcherError::InvalidPath(_))));
    }

    #[test]
    fn test_restart_policy_defaults() {
        let policy = RestartPolicy::default();
        assert_eq!(policy.delay, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 5);
    }

    #[tokio::test]
    async fn test_notify_source_detects_append() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("game.log");
        std::fs::write(&file_path, "").unwrap();

        let (sink, mut streams) = change_channel();
        let source = NotifySource::spawn(
            &file_path,
            Duration::from_secs(60),
            RestartPolicy::default(),
            sink,
            CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(source.watch_path(), file_path.as_path());

        // Activation trigger, then a real event for the append.
        let activated = tokio::time::timeout(Duration::from_secs(2), streams.changes.recv()).await;
        if !matches!(activated, Ok(Some(_))) {
            source.stop().await;
            if let Ok(message) = streams.errors.try_recv() {
                eprintln!("Skipping test due to watcher failure: {message}");
            }
            return;
        }
        // Let the debouncer flush anything from before activation.
        tokio::time::sleep(Duration::from_millis(300)).await;
        while streams.changes.try_recv().is_ok() {}

        {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&file_path)
                .unwrap();
            writeln!(file, "Script error: boom").unwrap();
        }

        let event = tokio::time::timeout(Duration::from_secs(2), streams.changes.recv()).await;
        source.stop().await;

        match event {
            Ok(Some(change)) => assert!(change.path.ends_with("game.log")),
            _ => {
                // Skip if the platform could not create a watcher
                if let Ok(message) = streams.errors.try_recv() {
                    eprintln!("Skipping test due to watcher failure: {message}");
                }
            }
        }
    }

    #[tokio::test]
    async fn test_missing_directory_falls_back_to_polling() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("missing").join("game.log");

        let (sink, mut streams) = change_channel();
        let policy = RestartPolicy {
            delay: Duration::from_millis(10),
            max_attempts: 1,
        };
        let source = NotifySource::spawn(
            &file_path,
            Duration::from_millis(20),
            policy,
            sink,
            CancellationToken::new(),
        )
        .unwrap();

        // Two creation failures, then the fallback notice. No activation
        // trigger is sent because no watcher ever came up.
        let mut messages = Vec::new();
        for _ in 0..3 {
            let message = tokio::time::timeout(Duration::from_secs(2), streams.errors.recv())
                .await
                .unwrap()
                .unwrap();
            messages.push(message);
        }
        assert!(messages[2].contains("falling back to polling"));

        let tick = tokio::time::timeout(Duration::from_secs(2), streams.changes.recv())
            .await
            .unwrap();
        assert!(tick.is_some());

        source.stop().await;
    }

    #[tokio::test]
    async fn test_activation_sends_recheck_trigger() {
        let (sink, mut streams) = change_channel();
        let cancel = CancellationToken::new();
        let target = WatchTarget::new(Path::new("/logs/game.log")).unwrap();

        let handle = tokio::spawn(supervise_with(
            target,
            Duration::from_secs(60),
            RestartPolicy::default(),
            sink,
            cancel.clone(),
            |_: &WatchTarget, _: ChangeSink, fault_tx: FaultSender| Ok(fault_tx),
        ));

        let trigger = tokio::time::timeout(Duration::from_secs(2), streams.changes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(trigger.kind, ChangeKind::Modified);
        assert_eq!(trigger.path, PathBuf::from("/logs/game.log"));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_fault_is_reported_and_watcher_recreated() {
        let (sink, mut streams) = change_channel();
        let cancel = CancellationToken::new();
        let target = WatchTarget::new(Path::new("/logs/game.log")).unwrap();
        let policy = RestartPolicy {
            delay: Duration::from_secs(1),
            max_attempts: 3,
        };

        let created = Arc::new(AtomicU32::new(0));
        let faults: Arc<Mutex<Option<FaultSender>>> = Arc::default();
        let start_watcher = {
            let created = Arc::clone(&created);
            let faults = Arc::clone(&faults);
            move |_: &WatchTarget, _: ChangeSink, fault_tx: FaultSender| {
                created.fetch_add(1, Ordering::SeqCst);
                *faults.lock().unwrap() = Some(fault_tx);
                Ok(())
            }
        };

        let handle = tokio::spawn(supervise_with(
            target,
            Duration::from_secs(60),
            policy,
            sink,
            cancel.clone(),
            start_watcher,
        ));

        assert!(streams.changes.recv().await.is_some());
        assert_eq!(created.load(Ordering::SeqCst), 1);

        let fault_tx = faults.lock().unwrap().take().unwrap();
        fault_tx
            .send(vec![notify::Error::generic("event queue overflow")])
            .unwrap();

        let message = streams.errors.recv().await.unwrap();
        assert!(message.contains("event queue overflow"));

        let faulted_at = tokio::time::Instant::now();
        let trigger = streams.changes.recv().await.unwrap();
        assert!(faulted_at.elapsed() >= policy.delay);
        assert_eq!(trigger.kind, ChangeKind::Modified);
        assert_eq!(created.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
    }
}
