//! Tailing aggregator: lifecycle, change processing and publication.

mod aggregator;
mod error;
mod publisher;
mod snapshot;
mod state;

pub use aggregator::{
    TailingAggregator, DEFAULT_STOP_TIMEOUT, ERROR_CHANNEL_CAPACITY, SNAPSHOT_CHANNEL_CAPACITY,
};
pub use error::MonitorError;
pub use snapshot::AggregateSnapshot;
pub use state::{MonitorState, StateMachine};
