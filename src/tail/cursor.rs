//! Byte-offset cursor over a growing log file.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::error::TailError;
use super::reader::{
    is_lock_contention, modified_time, open_shared, read_complete_lines, FullRead,
};
use crate::classify::LogLine;

/// Position of a [`TailCursor`] within its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailState {
    /// File being tailed.
    pub file_path: PathBuf,
    /// Bytes already consumed.
    pub byte_offset: u64,
    /// Modification time observed at the last successful read.
    pub last_modified_at: SystemTime,
    /// Complete lines consumed so far, unknown when tailing began mid-file.
    pub lines_read: Option<u64>,
}

impl TailState {
    fn new(file_path: PathBuf) -> Self {
        Self {
            file_path,
            byte_offset: 0,
            last_modified_at: UNIX_EPOCH,
            lines_read: Some(0),
        }
    }
}

/// Incremental line reader that tracks its read position.
///
/// Only lines appended since the last read are returned. Shrinking or
/// recreation of the file resets the cursor to the beginning.
#[derive(Debug)]
pub struct TailCursor {
    state: TailState,
}

impl TailCursor {
    /// Create a cursor for `path`.
    ///
    /// If the file exists, its modification time is recorded and the offset
    /// is set to its length when `start_at_end` is true, or `0` otherwise.
    /// A missing file starts at offset `0` with an epoch timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::EmptyPath`] if `path` is empty.
    pub async fn initialize(path: impl Into<PathBuf>, start_at_end: bool) -> Result<Self, TailError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(TailError::EmptyPath);
        }

        let mut state = TailState::new(path);
        if let Ok(metadata) = tokio::fs::metadata(&state.file_path).await {
            state.last_modified_at = modified_time(&metadata);
            if start_at_end && metadata.len() > 0 {
                state.byte_offset = metadata.len();
                state.lines_read = None;
            }
        }

        tracing::debug!(
            path = %state.file_path.display(),
            offset = state.byte_offset,
            "Tail cursor initialized"
        );
        Ok(Self { state })
    }

    /// Current cursor state.
    #[must_use]
    pub fn state(&self) -> &TailState {
        &self.state
    }

    /// Get the current byte offset.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.state.byte_offset
    }

    /// Get the path being tailed.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.state.file_path
    }

    /// Cheap check for whether a read could yield anything.
    ///
    /// True when the file length differs from the stored offset or the file
    /// was modified after the last read. A file that vanished reports new
    /// content only if the cursor still needs resetting.
    pub async fn has_new_content(&self) -> bool {
        match tokio::fs::metadata(&self.state.file_path).await {
            Ok(metadata) => {
                metadata.len() != self.state.byte_offset
                    || modified_time(&metadata) > self.state.last_modified_at
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.state.byte_offset != 0,
            Err(e) => {
                tracing::debug!(
                    path = %self.state.file_path.display(),
                    error = %e,
                    "Metadata unavailable, assuming no new content"
                );
                false
            }
        }
    }

    /// Read lines appended since the last read.
    ///
    /// If the file is now shorter than the stored offset it was truncated or
    /// recreated: the cursor resets and the whole file is read as new. If the
    /// file is missing the cursor resets and nothing is returned. A lock held
    /// by the writer yields no lines and leaves the cursor untouched.
    ///
    /// # Errors
    ///
    /// Returns [`TailError::Io`] for read failures other than lock contention.
    pub async fn read_new_lines(&mut self) -> Result<Vec<String>, TailError> {
        let file = match open_shared(&self.state.file_path).await {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if self.state.byte_offset != 0 {
                    tracing::warn!(
                        path = %self.state.file_path.display(),
                        "File deleted, resetting offset to 0"
                    );
                    self.reset();
                }
                return Ok(Vec::new());
            }
            Err(e) if is_lock_contention(&e) => {
                self.log_contention(&e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(TailError::Io(e)),
        };

        match self.read_from(file).await {
            Ok(lines) => Ok(lines),
            Err(e) if is_lock_contention(&e) => {
                self.log_contention(&e);
                Ok(Vec::new())
            }
            Err(e) => Err(TailError::Io(e)),
        }
    }

    /// Read lines appended since the last read, numbered by position.
    ///
    /// Line numbers are 1-based and unknown (`None`) when the cursor was
    /// initialized at the end of an existing file.
    ///
    /// # Errors
    ///
    /// Same as [`TailCursor::read_new_lines`].
    pub async fn read_new_log_lines(&mut self) -> Result<Vec<LogLine>, TailError> {
        let lines = self.read_new_lines().await?;
        let read = lines.len() as u64;
        let first = self.state.lines_read.map(|n| n.saturating_sub(read) + 1);

        Ok(lines
            .into_iter()
            .zip(0u64..)
            .map(|(text, i)| match first {
                Some(first) => LogLine::numbered(text, first + i),
                None => LogLine::new(text),
            })
            .collect())
    }

    async fn read_from(&mut self, file: tokio::fs::File) -> io::Result<Vec<String>> {
        let metadata = file.metadata().await?;
        let file_len = metadata.len();
        let modified = modified_time(&metadata);

        // Detect truncation (file is now smaller than our offset)
        if file_len < self.state.byte_offset {
            tracing::warn!(
                path = %self.state.file_path.display(),
                old_offset = self.state.byte_offset,
                new_len = file_len,
                "File truncated, resetting offset to 0"
            );
            self.reset();
        }

        if file_len == self.state.byte_offset {
            self.state.last_modified_at = modified;
            return Ok(Vec::new());
        }

        let chunk = read_complete_lines(file, self.state.byte_offset).await?;
        self.state.byte_offset = chunk.end_offset;
        self.state.last_modified_at = modified;
        self.state.lines_read = self
            .state
            .lines_read
            .map(|n| n + chunk.lines.len() as u64);

        tracing::trace!(
            path = %self.state.file_path.display(),
            offset = self.state.byte_offset,
            lines = chunk.lines.len(),
            "Read new lines"
        );
        Ok(chunk.lines)
    }

    fn log_contention(&self, err: &io::Error) {
        tracing::debug!(
            path = %self.state.file_path.display(),
            error = %err,
            "File locked by writer, retrying next cycle"
        );
    }

    /// Reset the offset to the beginning of the file.
    pub fn reset(&mut self) {
        self.state.byte_offset = 0;
        self.state.last_modified_at = UNIX_EPOCH;
        self.state.lines_read = Some(0);
    }

    /// Move the cursor past everything a full read of the same file consumed.
    pub fn fast_forward(&mut self, full: &FullRead) {
        self.state.byte_offset = full.end_offset;
        self.state.last_modified_at = full.modified;
        self.state.lines_read = Some(full.lines.len() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[tokio::test]
    async fn test_initialize_rejects_empty_path() {
        let result = TailCursor::initialize("", false).await;
        assert!(matches!(result, Err(TailError::EmptyPath)));
    }

    #[tokio::test]
    async fn test_initialize_missing_file() {
        let dir = TempDir::new().unwrap();
        let cursor = TailCursor::initialize(dir.path().join("game.log"), true)
            .await
            .unwrap();
        assert_eq!(cursor.offset(), 0);
        assert_eq!(cursor.state().last_modified_at, UNIX_EPOCH);
    }

    #[tokio::test]
    async fn test_initialize_at_start_or_end() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "abc\n").unwrap();
        file.flush().unwrap();

        let from_start = TailCursor::initialize(file.path(), false).await.unwrap();
        assert_eq!(from_start.offset(), 0);
        assert!(from_start.state().last_modified_at > UNIX_EPOCH);

        let from_end = TailCursor::initialize(file.path(), true).await.unwrap();
        assert_eq!(from_end.offset(), 4);
    }

    #[tokio::test]
    async fn test_reads_only_new_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "first").unwrap();
        file.flush().unwrap();

        let mut cursor = TailCursor::initialize(file.path(), false).await.unwrap();
        assert_eq!(cursor.read_new_lines().await.unwrap(), vec!["first"]);
        let offset_after_first = cursor.offset();

        assert!(cursor.read_new_lines().await.unwrap().is_empty());
        assert_eq!(cursor.offset(), offset_after_first);

        writeln!(file, "second").unwrap();
        writeln!(file, "third").unwrap();
        file.flush().unwrap();

        let lines = cursor.read_new_lines().await.unwrap();
        assert_eq!(lines, vec!["second", "third"]);
        assert!(cursor.offset() > offset_after_first);
    }

    #[tokio::test]
    async fn test_partial_line_is_deferred() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "Dumping Sta").unwrap();
        file.flush().unwrap();

        let mut cursor = TailCursor::initialize(file.path(), false).await.unwrap();
        assert!(cursor.read_new_lines().await.unwrap().is_empty());
        assert_eq!(cursor.offset(), 0);

        write!(file, "cks\n").unwrap();
        file.flush().unwrap();
        assert_eq!(cursor.read_new_lines().await.unwrap(), vec!["Dumping Stacks"]);
    }

    #[tokio::test]
    async fn test_deleted_file_resets_cursor() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("game.log");
        std::fs::write(&path, "line\n").unwrap();

        let mut cursor = TailCursor::initialize(&path, false).await.unwrap();
        assert_eq!(cursor.read_new_lines().await.unwrap().len(), 1);

        std::fs::remove_file(&path).unwrap();
        assert!(cursor.has_new_content().await);
        assert!(cursor.read_new_lines().await.unwrap().is_empty());
        assert_eq!(cursor.offset(), 0);
        assert!(!cursor.has_new_content().await);

        std::fs::write(&path, "again\n").unwrap();
        assert_eq!(cursor.read_new_lines().await.unwrap(), vec!["again"]);
    }

    #[tokio::test]
    async fn test_fast_forward_skips_consumed_content() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "old\n").unwrap();
        file.flush().unwrap();

        let mut cursor = TailCursor::initialize(file.path(), false).await.unwrap();
        let full = crate::tail::read_full(file.path()).await.unwrap();
        cursor.fast_forward(&full);
        assert_eq!(cursor.offset(), 4);
        assert!(!cursor.has_new_content().await);

        write!(file, "new\n").unwrap();
        file.flush().unwrap();
        let lines = cursor.read_new_log_lines().await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "new");
        assert_eq!(lines[0].line_number, Some(2));
    }

    #[tokio::test]
    async fn test_log_lines_are_numbered_across_reads() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "one\ntwo\n").unwrap();
        file.flush().unwrap();

        let mut cursor = TailCursor::initialize(file.path(), false).await.unwrap();
        let numbers: Vec<_> = cursor
            .read_new_log_lines()
            .await
            .unwrap()
            .iter()
            .map(|l| l.line_number)
            .collect();
        assert_eq!(numbers, vec![Some(1), Some(2)]);

        write!(file, "Script error: three\n").unwrap();
        file.flush().unwrap();
        let lines = cursor.read_new_log_lines().await.unwrap();
        assert_eq!(lines[0].line_number, Some(3));
        assert_eq!(lines[0].kind(), crate::classify::EventKind::Error);
        assert_eq!(cursor.state().lines_read, Some(3));
    }

    #[tokio::test]
    async fn test_log_lines_unnumbered_when_started_mid_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "old\n").unwrap();
        file.flush().unwrap();

        let mut cursor = TailCursor::initialize(file.path(), true).await.unwrap();
        write!(file, "new\n").unwrap();
        file.flush().unwrap();

        let lines = cursor.read_new_log_lines().await.unwrap();
        assert_eq!(lines[0].line_number, None);

        cursor.reset();
        let lines = cursor.read_new_log_lines().await.unwrap();
        assert_eq!(lines[1].line_number, Some(2));
    }

    #[tokio::test]
    async fn test_reset() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "a\nb\n").unwrap();
        file.flush().unwrap();

        let mut cursor = TailCursor::initialize(file.path(), true).await.unwrap();
        assert_eq!(cursor.offset(), 4);
        cursor.reset();
        assert_eq!(cursor.offset(), 0);
        assert_eq!(cursor.read_new_lines().await.unwrap(), vec!["a", "b"]);
    }
}
