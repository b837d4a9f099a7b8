//! Timer-driven change source.

use std::path::PathBuf;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{ChangeEvent, ChangeSink};

/// Emits a `Modified` trigger on a fixed period.
#[derive(Debug)]
pub struct IntervalSource {
    period: Duration,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl IntervalSource {
    /// Start ticking every `period` until `cancel` fires.
    ///
    /// The first tick happens one full period after the call.
    #[must_use]
    pub fn spawn(
        path: PathBuf,
        period: Duration,
        sink: ChangeSink,
        cancel: CancellationToken,
    ) -> Self {
        let handle = tokio::spawn(run_interval(path, period, sink, cancel.clone()));
        Self {
            period,
            cancel,
            handle,
        }
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stop ticking and wait for the timer task to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Interval task ended abnormally");
        }
    }
}

/// Tick loop shared with the notification source's polling fallback.
pub(super) async fn run_interval(
    path: PathBuf,
    period: Duration,
    sink: ChangeSink,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::debug!(
        path = %path.display(),
        period_ms = period.as_millis(),
        "Polling for changes"
    );

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !sink.signal(ChangeEvent::modified(path.clone())) {
                    break;
                }
            }
        }
    }
}
