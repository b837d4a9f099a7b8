//! Pattern-based line classifier.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::EventCounts;

/// Marker written once at the start of every stack dump block.
const DUMP_BLOCK_MARKER: &str = "Dumping Stacks";

/// Marker written for each individual stack frame.
///
/// This is a prefix of [`DUMP_BLOCK_MARKER`], so it must be tested after it.
const STACK_FRAME_MARKER: &str = "Dumping Stack";

static WARNING_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i) warning: ").expect("warning pattern is valid"));

static ERROR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i) error: ").expect("error pattern is valid"));

/// Kind of event a single log line represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Start of a stack dump block.
    DumpBlockStart,
    /// One frame inside a stack dump.
    StackFrame,
    /// Script or engine warning.
    Warning,
    /// Script or engine error.
    Error,
    /// Anything not matched by a more specific rule.
    #[default]
    Info,
}

/// A single line read from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Raw text without the line terminator.
    pub text: String,
    /// 1-based line number, when known.
    pub line_number: Option<u64>,
    /// When the line was read.
    pub discovered_at: DateTime<Utc>,
}

impl LogLine {
    /// Create a line with no known line number.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            line_number: None,
            discovered_at: Utc::now(),
        }
    }

    /// Create a line with a known 1-based line number.
    #[must_use]
    pub fn numbered(text: impl Into<String>, line_number: u64) -> Self {
        Self {
            line_number: Some(line_number),
            ..Self::new(text)
        }
    }

    /// Classify this line.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        classify(&self.text)
    }
}

/// Classify a single line.
///
/// Rules are tested in order: dump block start, stack frame, warning,
/// error. The first match wins; unmatched lines are [`EventKind::Info`].
#[must_use]
pub fn classify(line: &str) -> EventKind {
    if line.contains(DUMP_BLOCK_MARKER) {
        EventKind::DumpBlockStart
    } else if line.contains(STACK_FRAME_MARKER) {
        EventKind::StackFrame
    } else if WARNING_PATTERN.is_match(line) {
        EventKind::Warning
    } else if ERROR_PATTERN.is_match(line) {
        EventKind::Error
    } else {
        EventKind::Info
    }
}

/// Count lines by kind.
#[must_use]
pub fn fold(lines: &[LogLine]) -> EventCounts {
    fold_text(lines.iter().map(|l| l.text.as_str()))
}

/// Count raw text lines by kind.
#[must_use]
pub fn fold_text<I>(lines: I) -> EventCounts
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    lines
        .into_iter()
        .fold(EventCounts::default(), |mut counts, line| {
            counts.record(classify(line.as_ref()));
            counts
        })
}
