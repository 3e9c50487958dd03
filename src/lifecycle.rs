//! Open -> Closed transition for a meeting.
//!
//! Closing is terminal: a complete meeting never reopens, and a repeat close
//! request is a no-op. The end time comes from the request when supplied,
//! otherwise from the latest applied sample; a meeting with neither stays
//! open.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;
use std::fmt;

use crate::constants::TIME_FORMAT;
use crate::queries::meetings;

/// Errors from a close attempt
#[derive(Debug)]
pub enum CloseError {
    /// Neither the request nor the meeting's applied samples can supply an
    /// end time; the meeting stays open
    NoEndTime,
    /// The request's explicit end time is not a parseable timestamp
    BadEndTime { value: String },
    Db(rusqlite::Error),
}

impl fmt::Display for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseError::NoEndTime => {
                write!(f, "Cannot close meeting: no end time supplied and no samples applied")
            }
            CloseError::BadEndTime { value } => {
                write!(f, "Unparseable end time: '{}'", value)
            }
            CloseError::Db(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for CloseError {}

impl From<rusqlite::Error> for CloseError {
    fn from(e: rusqlite::Error) -> Self {
        CloseError::Db(e)
    }
}

/// Parse a hub-supplied wall-clock string. Hubs send the collector's plain
/// format; RFC 3339 is accepted as a fallback.
pub fn parse_time_ms(value: &str) -> Option<i64> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, TIME_FORMAT) {
        return Some(naive.and_utc().timestamp_millis());
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
}

/// Close a meeting, computing its end time.
///
/// Precedence: explicit `end_time` from the request, else
/// `latest_sample_time` (the tracker's last applied timestamp, epoch
/// seconds). Returns the stored end time in epoch ms. Already-complete
/// meetings are left untouched.
pub fn close_meeting(
    conn: &Connection,
    meeting_uuid: &str,
    end_time: Option<&str>,
    ending_method: Option<&str>,
    latest_sample_time: Option<f64>,
) -> Result<i64, CloseError> {
    let (is_complete, existing_end): (i64, Option<i64>) = conn.query_row(
        "SELECT is_complete, end_time_ms FROM meetings WHERE uuid = ?1",
        [meeting_uuid],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    if is_complete != 0 {
        // Terminal state; no transition back to open and no re-derivation
        return Ok(existing_end.unwrap_or_default());
    }

    let end_time_ms = match end_time {
        Some(value) => parse_time_ms(value).ok_or_else(|| CloseError::BadEndTime {
            value: value.to_string(),
        })?,
        None => match latest_sample_time {
            Some(ts) => (ts * 1000.0) as i64,
            None => return Err(CloseError::NoEndTime),
        },
    };

    conn.execute(&meetings::close(meeting_uuid, end_time_ms, ending_method), [])?;
    Ok(end_time_ms)
}
