//! Append-only byte stream for the legacy (v1) upload generation.
//!
//! Each meeting on the old protocol owns one newline-delimited log file at
//! `<data_dir>/<meeting_uuid>.log`. Lines are written verbatim and never
//! rewritten or removed. The only structured read is recovering the last
//! complete line to rebuild a meeting's position state after a restart.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::log_entry::{EntryError, LegacyLine};

/// Upper bound for the tail block read during recovery. Hub log lines are a
/// few hundred bytes; anything longer triggers the full reverse read.
const MAX_LINE_BYTES: u64 = 64 * 1024;

/// Path of a meeting's legacy log file
pub fn log_path(data_dir: &Path, meeting_uuid: &str) -> PathBuf {
    data_dir.join(format!("{}.log", meeting_uuid))
}

/// Scoped handle on a meeting's append-only log.
///
/// Holds an exclusive file lock for its lifetime so concurrent requests for
/// the same meeting cannot interleave writes; the lock is released when the
/// handle drops, on success and error paths alike.
pub struct LegacyLog {
    file: File,
}

impl LegacyLog {
    /// Open the meeting's log for appending, creating it if absent
    pub fn open_or_create(
        data_dir: &Path,
        meeting_uuid: &str,
    ) -> Result<LegacyLog, Box<dyn std::error::Error>> {
        let path = log_path(data_dir, meeting_uuid);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.try_lock_exclusive().map_err(|e| {
            format!(
                "Log file for meeting '{}' is locked by another writer: {}",
                meeting_uuid, e
            )
        })?;
        Ok(LegacyLog { file })
    }

    /// Truncate and rewrite the stream. Used when a hub re-uploads its whole
    /// log file on meeting creation/re-attach; never used on the append path.
    pub fn replace(
        data_dir: &Path,
        meeting_uuid: &str,
        contents: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let path = log_path(data_dir, meeting_uuid);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        file.try_lock_exclusive().map_err(|e| {
            format!(
                "Log file for meeting '{}' is locked by another writer: {}",
                meeting_uuid, e
            )
        })?;
        file.write_all(contents.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Append lines verbatim in the order given, flushing before returning
    pub fn append(&mut self, lines: &[LegacyLine]) -> Result<(), std::io::Error> {
        for line in lines {
            self.file.write_all(line.encode().as_bytes())?;
        }
        self.file.flush()
    }
}

/// Recover the last complete line's serial and time from a meeting's log.
///
/// Returns `Ok(None)` when the stream is missing or empty - a newly created
/// meeting legitimately has no history yet. A present but unparseable final
/// line is a real error.
pub fn recover_last_line(
    data_dir: &Path,
    meeting_uuid: &str,
) -> Result<Option<LegacyLine>, EntryError> {
    let path = log_path(data_dir, meeting_uuid);
    recover_last_line_bounded(&path, MAX_LINE_BYTES)
}

/// Reverse scan with an explicit tail bound (separated out for testing the
/// full-read fallback)
fn recover_last_line_bounded(
    path: &Path,
    bound: u64,
) -> Result<Option<LegacyLine>, EntryError> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return Ok(None),
    };

    let len = match file.metadata() {
        Ok(m) => m.len(),
        Err(_) => return Ok(None),
    };
    if len == 0 {
        return Ok(None);
    }

    // Read a tail block bounded by the expected maximum line length instead
    // of seeking backward one byte at a time
    let take = bound.min(len);
    let line = match read_last_line_from_tail(&mut file, len, take) {
        Ok(Some(line)) => line,
        // No terminator inside the bound: fall back to scanning the whole file
        Ok(None) if take < len => match read_last_line_from_tail(&mut file, len, len) {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(None),
            Err(_) => return Ok(None),
        },
        Ok(None) => return Ok(None),
        Err(_) => return Ok(None),
    };

    LegacyLine::decode(&line).map(Some)
}

/// Read the final `take` bytes and extract the last line.
///
/// Returns `Ok(None)` when no line boundary exists inside the block and the
/// block does not start at offset zero (the caller then widens the scan).
fn read_last_line_from_tail(
    file: &mut File,
    len: u64,
    take: u64,
) -> Result<Option<String>, std::io::Error> {
    file.seek(SeekFrom::Start(len - take))?;
    let mut buf = vec![0u8; take as usize];
    file.read_exact(&mut buf)?;

    // Ignore the stream's final newline so the scan lands on the start of
    // the last complete line rather than on its terminator
    let end = if buf.ends_with(b"\n") {
        buf.len() - 1
    } else {
        buf.len()
    };

    match buf[..end].iter().rposition(|&b| b == b'\n') {
        Some(pos) => Ok(Some(String::from_utf8_lossy(&buf[pos + 1..]).into_owned())),
        None if take == len => {
            // The whole stream is a single line
            Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
        }
        None => Ok(None),
    }
}
