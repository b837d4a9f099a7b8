//! Monitoring lifecycle state machine.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Lifecycle state of a [`TailingAggregator`](super::TailingAggregator).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    #[default]
    Idle,
    Starting,
    Monitoring,
    Stopping,
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Monitoring => "monitoring",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// State holder that notifies subscribers of every actual transition.
#[derive(Debug)]
pub struct StateMachine {
    tx: watch::Sender<MonitorState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(MonitorState::Idle);
        Self { tx }
    }

    #[must_use]
    pub fn state(&self) -> MonitorState {
        *self.tx.borrow()
    }

    /// Move to `new_state`.
    ///
    /// Returns `false` and notifies nobody if already in that state.
    pub fn transition(&self, new_state: MonitorState) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == new_state {
                return false;
            }
            tracing::debug!(from = %state, to = %new_state, "State transition");
            *state = new_state;
            true
        })
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        let machine = StateMachine::new();
        assert_eq!(machine.state(), MonitorState::Idle);
    }

    #[test]
    fn test_transition_notifies_subscribers() {
        let machine = StateMachine::new();
        let mut rx = machine.subscribe();

        assert!(machine.transition(MonitorState::Starting));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), MonitorState::Starting);
    }

    #[test]
    fn test_repeated_transition_is_silent() {
        let machine = StateMachine::new();
        let mut rx = machine.subscribe();

        assert!(!machine.transition(MonitorState::Idle));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), MonitorState::Idle);
    }

    #[test]
    fn test_display() {
        assert_eq!(MonitorState::Monitoring.to_string(), "monitoring");
        assert_eq!(MonitorState::Stopping.to_string(), "stopping");
    }
}
