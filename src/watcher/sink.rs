//! Channels between change sources and their consumer.

use tokio::sync::mpsc::{self, error::TrySendError};

use super::ChangeEvent;

/// Capacity of the trigger channel.
///
/// One pending trigger is enough: a queued trigger already causes the
/// consumer to re-check the whole file, so later ones are coalesced into it.
pub const TRIGGER_CAPACITY: usize = 1;

/// Sending half handed to a change source.
#[derive(Debug, Clone)]
pub struct ChangeSink {
    changes: mpsc::Sender<ChangeEvent>,
    errors: mpsc::UnboundedSender<String>,
}

/// Receiving half consumed by the aggregator.
#[derive(Debug)]
pub struct ChangeStreams {
    pub changes: mpsc::Receiver<ChangeEvent>,
    pub errors: mpsc::UnboundedReceiver<String>,
}

/// Create a connected sink/stream pair.
#[must_use]
pub fn change_channel() -> (ChangeSink, ChangeStreams) {
    let (change_tx, change_rx) = mpsc::channel(TRIGGER_CAPACITY);
    let (error_tx, error_rx) = mpsc::unbounded_channel();
    (
        ChangeSink {
            changes: change_tx,
            errors: error_tx,
        },
        ChangeStreams {
            changes: change_rx,
            errors: error_rx,
        },
    )
}

impl ChangeSink {
    /// Queue a trigger without blocking.
    ///
    /// Returns `false` once the consumer is gone. A full queue counts as
    /// delivered.
    pub fn signal(&self, event: ChangeEvent) -> bool {
        match self.changes.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::trace!(kind = ?event.kind, "Trigger coalesced into pending one");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Report a human-readable error.
    pub fn report(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(error = %message, "Change source error");
        let _ = self.errors.send(message);
    }

    /// Whether the consumer has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.changes.is_closed()
    }
}
