//! Change notifications.

use std::ffi::OsStr;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use notify::event::ModifyKind;
use serde::{Deserialize, Serialize};

/// What happened to the watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

/// Signal that the watched file may have changed.
///
/// Consumers treat every kind the same way: as a reason to re-check the
/// file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    #[must_use]
    pub fn new(path: PathBuf, kind: ChangeKind) -> Self {
        Self {
            path,
            kind,
            timestamp: Utc::now(),
        }
    }

    /// A `Modified` event, as emitted by timer ticks.
    #[must_use]
    pub fn modified(path: PathBuf) -> Self {
        Self::new(path, ChangeKind::Modified)
    }

    /// Translate a notify event touching `file_name`.
    ///
    /// Returns `None` for events on other files and for kinds that cannot
    /// change the file's content (access, metadata-less "other").
    #[must_use]
    pub fn from_notify(event: &notify::Event, file_name: &OsStr) -> Option<Self> {
        use notify::EventKind;

        let path = event
            .paths
            .iter()
            .find(|p| p.file_name() == Some(file_name))?;

        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Renamed,
            EventKind::Modify(_) => ChangeKind::Modified,
            EventKind::Remove(_) => ChangeKind::Deleted,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => return None,
        };

        Some(Self::new(path.clone(), kind))
    }
}
