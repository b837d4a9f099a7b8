//! Bounded history of published snapshots.
//!
//! A passive subscriber to the aggregator's snapshot channel. Keeps the
//! most recent snapshots up to a fixed capacity.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::monitor::AggregateSnapshot;

/// Default number of snapshots kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Ring buffer of snapshots, oldest first.
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    entries: VecDeque<AggregateSnapshot>,
    capacity: usize,
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl SnapshotHistory {
    /// Create an empty history holding at most `capacity` snapshots.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a snapshot, evicting the oldest one when full.
    pub fn push(&mut self, snapshot: AggregateSnapshot) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn latest(&self) -> Option<&AggregateSnapshot> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AggregateSnapshot> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Record every snapshot from `rx` into `history` until `cancel` fires or
/// the channel closes.
///
/// Snapshots missed because the recorder lagged are skipped with a warning.
pub fn spawn_recorder(
    history: Arc<Mutex<SnapshotHistory>>,
    mut rx: broadcast::Receiver<AggregateSnapshot>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                biased;

                () = cancel.cancelled() => break,
                received = rx.recv() => received,
            };

            match received {
                Ok(snapshot) => history
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(snapshot),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "History recorder lagged, snapshots dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
