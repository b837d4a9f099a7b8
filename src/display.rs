//! Colored CLI display utilities for monitor output.
//!
//! This module provides functions for printing colored, formatted output
//! to the terminal while a log file is being monitored.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::monitor::{AggregateSnapshot, MonitorState};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Format snapshot counters as a single line without colors.
#[must_use]
pub fn format_snapshot(snapshot: &AggregateSnapshot) -> String {
    counters_line(snapshot, false)
}

/// Counter line shared by the plain and colored renderings.
fn counters_line(snapshot: &AggregateSnapshot, colored: bool) -> String {
    let dumps = snapshot.dump_count.to_string();
    let stacks = snapshot.stack_count.to_string();
    let warnings = snapshot.warning_count.to_string();
    let errors = snapshot.error_count.to_string();
    let ratio = format!("{:.3}", snapshot.ratio);

    let (dumps, stacks, warnings, errors, ratio) = if colored {
        (
            dumps.cyan().to_string(),
            stacks.cyan().to_string(),
            if snapshot.warning_count > 0 {
                warnings.yellow().to_string()
            } else {
                warnings.green().to_string()
            },
            if snapshot.error_count > 0 {
                errors.red().bold().to_string()
            } else {
                errors.green().to_string()
            },
            ratio.magenta().to_string(),
        )
    } else {
        (dumps, stacks, warnings, errors, ratio)
    };

    format!("dumps={dumps} stacks={stacks} warnings={warnings} errors={errors} ratio={ratio}")
}

/// Print a published snapshot.
pub fn print_snapshot(snapshot: &AggregateSnapshot) {
    println!(
        "{} {} {}",
        snapshot
            .timestamp
            .format("%Y-%m-%dT%H:%M:%S%.6fZ")
            .to_string()
            .dimmed(),
        "[SNAPSHOT]".blue().bold(),
        counters_line(snapshot, true)
    );
    let _ = io::stdout().flush();
}

/// Print a snapshot as one line of JSON.
pub fn print_snapshot_json(snapshot: &AggregateSnapshot) {
    match serde_json::to_string(snapshot) {
        Ok(json) => println!("{json}"),
        Err(e) => print_error(&format!("Failed to serialize snapshot: {e}")),
    }
    let _ = io::stdout().flush();
}

/// Print a lifecycle transition.
pub fn print_state(state: MonitorState) {
    println!(
        "{} {} {}",
        timestamp().dimmed(),
        "[MONITOR]".green().bold(),
        state
    );
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    println!("{} {} {}", timestamp().dimmed(), "[ERROR]".red().bold(), message);
    let _ = io::stdout().flush();
}
