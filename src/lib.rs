//! Dumpwatch - real-time tailing and classification of crash/stack-dump logs.

pub mod classify;
pub mod config;
pub mod display;
pub mod history;
pub mod monitor;
pub mod tail;
pub mod watcher;
