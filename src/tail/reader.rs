//! Shared-access line reading.
//!
//! Files are always opened read-only with a sharing mode that lets the
//! writer keep appending, truncating or deleting the file while we read.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use super::error::TailError;

/// Result of reading a whole file from the start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullRead {
    /// Every complete line in the file.
    pub lines: Vec<String>,
    /// Byte offset just past the last complete line.
    pub end_offset: u64,
    /// Modification time of the file when it was opened.
    pub modified: SystemTime,
}

impl Default for FullRead {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            end_offset: 0,
            modified: UNIX_EPOCH,
        }
    }
}

/// Complete lines read from some offset onwards.
#[derive(Debug)]
pub(super) struct Chunk {
    pub lines: Vec<String>,
    pub end_offset: u64,
}

/// Open `path` for reading without excluding the writer.
pub(super) async fn open_shared(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true);
    #[cfg(windows)]
    {
        const FILE_SHARE_READ: u32 = 0x0000_0001;
        const FILE_SHARE_WRITE: u32 = 0x0000_0002;
        const FILE_SHARE_DELETE: u32 = 0x0000_0004;
        options.share_mode(FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE);
    }
    options.open(path).await
}

/// Whether an I/O error means the writer is holding a lock on the file.
pub(super) fn is_lock_contention(err: &io::Error) -> bool {
    const ERROR_SHARING_VIOLATION: i32 = 32;
    const ERROR_LOCK_VIOLATION: i32 = 33;

    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    cfg!(windows)
        && matches!(
            err.raw_os_error(),
            Some(ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION)
        )
}

/// Modification time of a file, or the epoch when the platform has none.
pub(super) fn modified_time(metadata: &std::fs::Metadata) -> SystemTime {
    metadata.modified().unwrap_or(UNIX_EPOCH)
}

/// Read newline-terminated lines from `start` to the end of the file.
///
/// A trailing fragment without a newline is not consumed; `end_offset`
/// stops right after the last `\n`.
pub(super) async fn read_complete_lines(mut file: File, start: u64) -> io::Result<Chunk> {
    file.seek(SeekFrom::Start(start)).await?;

    let mut reader = BufReader::new(file);
    let mut lines = Vec::new();
    let mut buf = Vec::new();
    let mut end_offset = start;

    loop {
        buf.clear();
        let bytes_read = reader.read_until(b'\n', &mut buf).await?;

        if bytes_read == 0 || buf.last() != Some(&b'\n') {
            break;
        }

        end_offset += bytes_read as u64;
        lines.push(decode_line(&buf));
    }

    Ok(Chunk { lines, end_offset })
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

/// Read every complete line of `path` from the beginning.
///
/// Independent of any [`TailCursor`](super::TailCursor). A missing file
/// reads as empty.
///
/// # Errors
///
/// Returns [`TailError::Locked`] if the writer holds a lock on the file, and
/// [`TailError::Io`] for any other read failure.
pub async fn read_full(path: &Path) -> Result<FullRead, TailError> {
    if path.as_os_str().is_empty() {
        return Err(TailError::EmptyPath);
    }

    let file = match open_shared(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "File not found, treating as empty");
            return Ok(FullRead::default());
        }
        Err(e) => return Err(map_io(path, e)),
    };

    let metadata = file.metadata().await.map_err(|e| map_io(path, e))?;
    let chunk = read_complete_lines(file, 0)
        .await
        .map_err(|e| map_io(path, e))?;

    Ok(FullRead {
        lines: chunk.lines,
        end_offset: chunk.end_offset,
        modified: modified_time(&metadata),
    })
}

fn map_io(path: &Path, err: io::Error) -> TailError {
    if is_lock_contention(&err) {
        TailError::Locked(PathBuf::from(path))
    } else {
        TailError::Io(err)
    }
}
