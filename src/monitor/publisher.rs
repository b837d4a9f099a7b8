//! Gated publication of snapshots and errors.
//!
//! Every publish for a run checks that run's cancellation token while
//! holding the gate, and stopping a run cancels its token while holding the
//! same gate. Once `close_run` returns, nothing more is published for it.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::AggregateSnapshot;
use crate::classify::EventCounts;

#[derive(Debug, Default)]
struct Gate {
    last: Option<AggregateSnapshot>,
}

/// Owner of the outbound channels and the last published snapshot.
#[derive(Debug)]
pub(super) struct Publisher {
    gate: Mutex<Gate>,
    snapshots: broadcast::Sender<AggregateSnapshot>,
    errors: broadcast::Sender<String>,
}

impl Publisher {
    pub fn new(snapshot_capacity: usize, error_capacity: usize) -> Self {
        let (snapshots, _) = broadcast::channel(snapshot_capacity);
        let (errors, _) = broadcast::channel(error_capacity);
        Self {
            gate: Mutex::new(Gate::default()),
            snapshots,
            errors,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<AggregateSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<String> {
        self.errors.subscribe()
    }

    pub fn last(&self) -> Option<AggregateSnapshot> {
        self.lock().last.clone()
    }

    /// Cancel `run` so none of its later publishes go through.
    pub fn close_run(&self, run: &CancellationToken) {
        let _gate = self.lock();
        run.cancel();
    }

    /// Publish the first snapshot of a run regardless of the previous one.
    pub fn publish_baseline(&self, run: &CancellationToken, snapshot: AggregateSnapshot) -> bool {
        let mut gate = self.lock();
        if run.is_cancelled() {
            return false;
        }
        self.send(&mut gate, snapshot);
        true
    }

    /// Publish `snapshot` if its counters differ from the last published one.
    pub fn publish_if_changed(
        &self,
        run: &CancellationToken,
        snapshot: AggregateSnapshot,
    ) -> Option<AggregateSnapshot> {
        let mut gate = self.lock();
        if run.is_cancelled() || gate.last.as_ref() == Some(&snapshot) {
            return None;
        }
        self.send(&mut gate, snapshot.clone());
        Some(snapshot)
    }

    /// Add `delta` on top of the last published counters and publish the
    /// result if it changed anything.
    pub fn apply_delta(
        &self,
        run: &CancellationToken,
        delta: EventCounts,
    ) -> Option<AggregateSnapshot> {
        let mut gate = self.lock();
        if run.is_cancelled() {
            return None;
        }
        let base = gate.last.as_ref().map(AggregateSnapshot::counts).unwrap_or_default();
        let next = AggregateSnapshot::from_counts(base + delta);
        if gate.last.as_ref() == Some(&next) {
            return None;
        }
        self.send(&mut gate, next.clone());
        Some(next)
    }

    /// Report an error on behalf of `run`.
    pub fn report(&self, run: &CancellationToken, message: impl Into<String>) {
        let _gate = self.lock();
        if run.is_cancelled() {
            return;
        }
        let _ = self.errors.send(message.into());
    }

    /// Report an error that belongs to no run, such as a rejected start.
    pub fn report_unscoped(&self, message: impl Into<String>) {
        let _ = self.errors.send(message.into());
    }

    fn send(&self, gate: &mut Gate, snapshot: AggregateSnapshot) {
        tracing::debug!(
            dumps = snapshot.dump_count,
            stacks = snapshot.stack_count,
            warnings = snapshot.warning_count,
            errors = snapshot.error_count,
            ratio = snapshot.ratio,
            "Publishing snapshot"
        );
        gate.last = Some(snapshot.clone());
        let _ = self.snapshots.send(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher() -> Publisher {
        Publisher::new(16, 16)
    }

    #[test]
    fn test_apply_delta_accumulates() {
        let publisher = publisher();
        let run = CancellationToken::new();
        let mut rx = publisher.subscribe_snapshots();

        publisher.publish_baseline(&run, AggregateSnapshot::from_counts(EventCounts::new(1, 2, 0, 0)));
        let next = publisher
            .apply_delta(&run, EventCounts::new(0, 2, 1, 0))
            .unwrap();

        assert_eq!(next.counts(), EventCounts::new(1, 4, 1, 0));
        assert_eq!(rx.try_recv().unwrap().counts(), EventCounts::new(1, 2, 0, 0));
        assert_eq!(rx.try_recv().unwrap().counts(), EventCounts::new(1, 4, 1, 0));
    }

    #[test]
    fn test_empty_delta_publishes_nothing() {
        let publisher = publisher();
        let run = CancellationToken::new();
        publisher.publish_baseline(&run, AggregateSnapshot::default());
        let mut rx = publisher.subscribe_snapshots();

        assert!(publisher.apply_delta(&run, EventCounts::default()).is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_if_changed_deduplicates() {
        let publisher = publisher();
        let run = CancellationToken::new();
        let snapshot = AggregateSnapshot::from_counts(EventCounts::new(0, 0, 1, 0));

        assert!(publisher.publish_if_changed(&run, snapshot.clone()).is_some());
        assert!(publisher.publish_if_changed(&run, snapshot).is_none());
    }

    #[test]
    fn test_closed_run_publishes_nothing() {
        let publisher = publisher();
        let run = CancellationToken::new();
        let mut snapshots = publisher.subscribe_snapshots();
        let mut errors = publisher.subscribe_errors();

        publisher.close_run(&run);

        assert!(!publisher.publish_baseline(&run, AggregateSnapshot::default()));
        assert!(publisher.apply_delta(&run, EventCounts::new(1, 0, 0, 0)).is_none());
        publisher.report(&run, "late error");

        assert!(snapshots.try_recv().is_err());
        assert!(errors.try_recv().is_err());
        assert!(publisher.last().is_none());
    }

    #[test]
    fn test_unscoped_report_always_sent() {
        let publisher = publisher();
        let mut errors = publisher.subscribe_errors();
        publisher.report_unscoped("bad config");
        assert_eq!(errors.try_recv().unwrap(), "bad config");
    }
}
