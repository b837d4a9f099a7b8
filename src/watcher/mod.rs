//! Change detection for the tailed log file.
//!
//! Two interchangeable strategies produce the same stream of
//! [`ChangeEvent`]s plus a stream of error messages: OS notifications
//! (with supervised restarts) and a fixed-period interval timer.

mod error;
mod event;
mod interval;
mod notify_source;
mod sink;
mod source;

pub use error::WatcherError;
pub use event::{ChangeEvent, ChangeKind};
pub use interval::IntervalSource;
pub use notify_source::{NotifySource, RestartPolicy, DEBOUNCE_TIMEOUT};
pub use sink::{change_channel, ChangeSink, ChangeStreams, TRIGGER_CAPACITY};
pub use source::{ChangeSource, SourceKind};
