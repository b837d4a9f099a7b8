//! Per-kind event counters.

use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use super::EventKind;

/// Counts of classified lines, one counter per tracked kind.
///
/// `Info` lines are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventCounts {
    pub dumps: u64,
    pub stacks: u64,
    pub warnings: u64,
    pub errors: u64,
}

impl EventCounts {
    #[must_use]
    pub fn new(dumps: u64, stacks: u64, warnings: u64, errors: u64) -> Self {
        Self {
            dumps,
            stacks,
            warnings,
            errors,
        }
    }

    /// Count one line of the given kind.
    pub fn record(&mut self, kind: EventKind) {
        match kind {
            EventKind::DumpBlockStart => self.dumps = self.dumps.saturating_add(1),
            EventKind::StackFrame => self.stacks = self.stacks.saturating_add(1),
            EventKind::Warning => self.warnings = self.warnings.saturating_add(1),
            EventKind::Error => self.errors = self.errors.saturating_add(1),
            EventKind::Info => {}
        }
    }

    /// True when no tracked event has been counted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Dumps per stack frame, `0.0` when there are no stack frames.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(&self) -> f64 {
        if self.stacks == 0 {
            0.0
        } else {
            self.dumps as f64 / self.stacks as f64
        }
    }
}

impl Add for EventCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            dumps: self.dumps.saturating_add(rhs.dumps),
            stacks: self.stacks.saturating_add(rhs.stacks),
            warnings: self.warnings.saturating_add(rhs.warnings),
            errors: self.errors.saturating_add(rhs.errors),
        }
    }
}

impl AddAssign for EventCounts {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
