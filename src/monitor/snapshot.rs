//! Aggregate snapshot of classified events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::EventCounts;

/// Running totals of classified events at one point in time.
///
/// Equality only compares the four counters: `timestamp` is always fresh
/// and `ratio` is derived from the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub timestamp: DateTime<Utc>,
    pub dump_count: u64,
    pub stack_count: u64,
    pub warning_count: u64,
    pub error_count: u64,
    /// `dump_count / stack_count`, or `0` when there are no stack frames.
    pub ratio: f64,
}

impl AggregateSnapshot {
    /// Build a snapshot from totals, stamped with the current time.
    #[must_use]
    pub fn from_counts(counts: EventCounts) -> Self {
        Self {
            timestamp: Utc::now(),
            dump_count: counts.dumps,
            stack_count: counts.stacks,
            warning_count: counts.warnings,
            error_count: counts.errors,
            ratio: counts.ratio(),
        }
    }

    /// The counters of this snapshot.
    #[must_use]
    pub fn counts(&self) -> EventCounts {
        EventCounts::new(
            self.dump_count,
            self.stack_count,
            self.warning_count,
            self.error_count,
        )
    }

    /// A new snapshot with `delta` added and the ratio recomputed.
    #[must_use]
    pub fn with_delta(&self, delta: EventCounts) -> Self {
        Self::from_counts(self.counts() + delta)
    }
}

impl Default for AggregateSnapshot {
    fn default() -> Self {
        Self::from_counts(EventCounts::default())
    }
}

impl PartialEq for AggregateSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.counts() == other.counts()
    }
}

impl Eq for AggregateSnapshot {}
