//! Per-request orchestration of the meeting log synchronization protocol.
//!
//! A creation request (PUT) establishes or re-attaches a meeting and seeds
//! its position tracker from the uploaded legacy log tail. An append request
//! (POST) resolves the meeting, verifies hub ownership, detects the protocol
//! generation from the batch shape, gap-checks against the tracker, writes
//! through the chunk store or the legacy append log, and advances the
//! tracker - all before an optional close transition.
//!
//! A batch is all-or-nothing: malformed entries, gaps, and authorization
//! failures short-circuit before any persistent mutation, and the database
//! writes for one request share a single transaction.

use log::warn;
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::path::Path;

use crate::analysis::MeetingSummary;
use crate::chunk_store;
use crate::legacy_log::LegacyLog;
use crate::lifecycle::{self, CloseError};
use crate::log_entry::{ChunkRecord, EntryError, LegacyLine};
use crate::position::{Decision, Position};
use crate::queries::{hubs, meetings};

/// Failure taxonomy for one synchronization request
#[derive(Debug)]
pub enum SyncError {
    /// Unparseable batch entry or request field; the request is rejected
    /// whole, with no writes
    Malformed(String),
    /// Append-only request referencing a session this collector has never
    /// seen
    UnknownMeeting { uuid: String },
    /// Requesting hub does not own the meeting (or the project); rejected
    /// with minimal detail
    Unauthorized,
    /// Close requested but no end time is determinable
    Close(CloseError),
    Db(rusqlite::Error),
    Io(std::io::Error),
    /// Legacy stream acquisition/replacement failure
    Log(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Malformed(reason) => write!(f, "Malformed request: {}", reason),
            SyncError::UnknownMeeting { uuid } => write!(f, "Unknown meeting: {}", uuid),
            SyncError::Unauthorized => write!(f, "Unauthorized"),
            SyncError::Close(e) => write!(f, "{}", e),
            SyncError::Db(e) => write!(f, "Database error: {}", e),
            SyncError::Io(e) => write!(f, "I/O error: {}", e),
            SyncError::Log(reason) => write!(f, "Log stream error: {}", reason),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<rusqlite::Error> for SyncError {
    fn from(e: rusqlite::Error) -> Self {
        SyncError::Db(e)
    }
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        SyncError::Io(e)
    }
}

impl From<EntryError> for SyncError {
    fn from(e: EntryError) -> Self {
        SyncError::Malformed(e.to_string())
    }
}

impl From<CloseError> for SyncError {
    fn from(e: CloseError) -> Self {
        match e {
            CloseError::Db(e) => SyncError::Db(e),
            other => SyncError::Close(other),
        }
    }
}

/// Creation / re-attach request body (PUT)
#[derive(Debug, Deserialize)]
pub struct CreateMeetingRequest {
    pub uuid: String,
    pub start_time: String,
    #[serde(default)]
    pub location: String,
    #[serde(rename = "type", default)]
    pub meeting_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_complete: bool,
    pub ending_method: Option<String>,
    pub end_time: Option<String>,
    /// Embedded raw legacy log (whole file, newline-delimited) used to seed
    /// initial position state
    pub log: Option<String>,
}

/// Append request body (POST)
#[derive(Debug, Deserialize)]
pub struct AppendRequest {
    pub uuid: String,
    #[serde(default)]
    pub chunks: Vec<Value>,
    #[serde(default)]
    pub is_complete: bool,
    pub ending_method: Option<String>,
    pub end_time: Option<String>,
}

/// The two upload generations, decided by the shape of the batch
enum Batch {
    /// v2: discrete indexed chunk objects
    Chunks(Vec<ChunkRecord>),
    /// v1: raw newline-terminated lines
    Lines(Vec<LegacyLine>),
}

/// Result of an append request
#[derive(Debug)]
pub enum AppendOutcome {
    /// Empty batch; distinct status, not an error
    NoData,
    /// Sequence discontinuity; the hub must resend from its last
    /// acknowledged position. Nothing was written.
    LogMismatch,
    /// Batch processed; carries the tracked position for the hub to confirm
    /// forward progress
    Applied {
        last_update_serial: Option<i64>,
        last_update_time: Option<f64>,
        /// Analysis summary when this request closed the meeting
        closed: Option<MeetingSummary>,
    },
}

/// Result of a creation / re-attach request
#[derive(Debug)]
pub struct CreateOutcome {
    /// False when the meeting already existed and was updated in place
    pub created: bool,
    pub last_update_serial: Option<i64>,
    pub last_update_time: Option<f64>,
    /// Analysis summary when this request closed the meeting
    pub closed: Option<MeetingSummary>,
}

/// Sync-relevant columns of one meeting row
#[derive(Debug, Clone)]
pub struct MeetingRow {
    pub uuid: String,
    pub project_key: String,
    pub hub_uuid: String,
    pub start_time_ms: i64,
    pub is_complete: bool,
    pub last_update_serial: Option<i64>,
    pub last_update_time: Option<f64>,
    pub final_chunk_index: Option<i64>,
}

/// Fetch a meeting's sync state by session uuid
pub fn get_meeting(conn: &Connection, uuid: &str) -> Result<Option<MeetingRow>, rusqlite::Error> {
    conn.query_row(&meetings::select_by_uuid(uuid), [], |row| {
        Ok(MeetingRow {
            uuid: uuid.to_string(),
            project_key: row.get(0)?,
            hub_uuid: row.get(1)?,
            start_time_ms: row.get(2)?,
            is_complete: row.get::<_, i64>(4)? != 0,
            last_update_serial: row.get(5)?,
            last_update_time: row.get(6)?,
            final_chunk_index: row.get(7)?,
        })
    })
    .optional()
}

/// Verify the requesting hub exists and belongs to the routed project
fn verify_hub(conn: &Connection, project_key: &str, hub_uuid: &str) -> Result<(), SyncError> {
    let hub_project: Option<String> = conn
        .query_row(&hubs::select_by_uuid(hub_uuid), [], |row| row.get(1))
        .optional()?;

    match hub_project {
        Some(key) if key == project_key => Ok(()),
        _ => Err(SyncError::Unauthorized),
    }
}

/// Classify a batch by shape: all objects is a chunk batch, all strings is a
/// legacy line batch. Decoding happens up front so a malformed entry rejects
/// the request before anything is written.
fn classify_batch(values: &[Value]) -> Result<Batch, SyncError> {
    if values.iter().all(|v| v.is_object()) {
        let chunks = values
            .iter()
            .map(ChunkRecord::decode)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Batch::Chunks(chunks));
    }

    if values.iter().all(|v| v.is_string()) {
        let lines = values
            .iter()
            .map(|v| LegacyLine::decode(v.as_str().unwrap_or_default()))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Batch::Lines(lines));
    }

    Err(SyncError::Malformed(
        "chunks must be all objects (v2) or all strings (v1)".to_string(),
    ))
}

/// Create a meeting, or re-attach a hub to one it already owns.
///
/// When the request embeds a legacy log, the stored stream is replaced with
/// the uploaded file and the position tracker re-seeded from its last
/// complete line. An empty or absent log seeds nothing; that is not an
/// error.
pub fn create_meeting(
    conn: &mut Connection,
    data_dir: &Path,
    project_key: &str,
    hub_uuid: &str,
    req: &CreateMeetingRequest,
) -> Result<CreateOutcome, SyncError> {
    verify_hub(conn, project_key, hub_uuid)?;

    let existing = get_meeting(conn, &req.uuid)?;
    if let Some(meeting) = &existing {
        if meeting.hub_uuid != hub_uuid {
            return Err(SyncError::Unauthorized);
        }
    }

    let start_time_ms = lifecycle::parse_time_ms(&req.start_time).ok_or_else(|| {
        SyncError::Malformed(format!("unparseable start_time '{}'", req.start_time))
    })?;

    // Parse the uploaded log's tail in memory first; a malformed upload
    // must be rejected before it can destroy the stored stream
    let seed = match &req.log {
        Some(contents) if !contents.is_empty() => {
            let line = seed_from_upload(&req.uuid, contents)?;
            LegacyLog::replace(data_dir, &req.uuid, contents)
                .map_err(|e| SyncError::Log(e.to_string()))?;
            line
        }
        _ => None,
    };

    let tx = conn.transaction()?;

    if existing.is_some() {
        tx.execute(
            &meetings::update_details(
                &req.uuid,
                start_time_ms,
                &req.location,
                &req.meeting_type,
                &req.description,
            ),
            [],
        )?;
    } else {
        tx.execute(
            &meetings::insert(
                &req.uuid,
                project_key,
                hub_uuid,
                start_time_ms,
                &req.location,
                &req.meeting_type,
                &req.description,
            ),
            [],
        )?;
    }

    let mut position = match &existing {
        Some(m) => Position {
            last_serial: m.last_update_serial,
            last_time: m.last_update_time,
        },
        None => Position::default(),
    };

    if let Some(line) = &seed {
        position = Position::seed(line.last_log_serial, line.last_log_time);
        tx.execute(
            &meetings::update_position(&req.uuid, line.last_log_serial, line.last_log_time),
            [],
        )?;
    }

    let closed = maybe_close(&tx, &req.uuid, req, &position, existing.as_ref(), start_time_ms)?;

    tx.commit()?;

    Ok(CreateOutcome {
        created: existing.is_none(),
        last_update_serial: position.last_serial,
        last_update_time: position.last_time,
        closed,
    })
}

/// Decode the last complete line of an uploaded log string. A log of only
/// newlines seeds nothing, like an empty stored stream; a present but
/// unparseable last line rejects the upload.
fn seed_from_upload(uuid: &str, contents: &str) -> Result<Option<LegacyLine>, SyncError> {
    let tail = contents.trim_end_matches('\n');
    if tail.is_empty() {
        return Ok(None);
    }
    let last_line = tail.rsplit('\n').next().unwrap_or(tail);
    let line = LegacyLine::decode(last_line).map_err(|e| {
        SyncError::Malformed(format!(
            "embedded log tail for meeting '{}' is unparseable: {}",
            uuid, e
        ))
    })?;
    Ok(Some(line))
}

/// Append one batch to a meeting.
///
/// The v2 and v1 branches are mutually exclusive; exactly one store is
/// written per request.
pub fn append_batch(
    conn: &mut Connection,
    data_dir: &Path,
    project_key: &str,
    hub_uuid: &str,
    req: &AppendRequest,
) -> Result<AppendOutcome, SyncError> {
    if req.chunks.is_empty() {
        warn!("No data received from {}", hub_uuid);
        return Ok(AppendOutcome::NoData);
    }

    // Decode everything before resolving the meeting so a malformed batch
    // never acquires state
    let batch = classify_batch(&req.chunks)?;

    verify_hub(conn, project_key, hub_uuid)?;

    let meeting = get_meeting(conn, &req.uuid)?.ok_or_else(|| SyncError::UnknownMeeting {
        uuid: req.uuid.clone(),
    })?;

    if meeting.hub_uuid != hub_uuid {
        return Err(SyncError::Unauthorized);
    }

    let mut position = Position {
        last_serial: meeting.last_update_serial,
        last_time: meeting.last_update_time,
    };

    match batch {
        Batch::Chunks(chunks) => {
            let start_serial = chunks[0].log_serial;
            if position.accept(start_serial) == Decision::Gap {
                warn!("Missed a chunk? Resend log file. {}", meeting.uuid);
                return Ok(AppendOutcome::LogMismatch);
            }

            let tx = conn.transaction()?;

            // Retransmissions are upserted too: a duplicate batch may be
            // correcting previously-written bad data
            for chunk in &chunks {
                chunk_store::upsert_chunk(&tx, &meeting.uuid, chunk)?;
            }
            // Batches may arrive unordered; the high-water mark is the
            // batch maximum, not the final element
            let top = chunks
                .iter()
                .max_by_key(|c| c.log_serial)
                .unwrap_or(&chunks[0]);
            let top_index = chunks
                .iter()
                .map(|c| c.log_index)
                .max()
                .unwrap_or(chunks[0].log_index);
            chunk_store::bump_final_chunk(&tx, &meeting.uuid, top_index)?;

            // The tracker only moves forward; a batch fully behind the
            // high-water mark is no forward progress
            if position.last_serial.map_or(true, |s| top.log_serial >= s) {
                position.advance(top.log_serial, top.log_timestamp);
                tx.execute(
                    &meetings::update_position(&meeting.uuid, top.log_serial, top.log_timestamp),
                    [],
                )?;
            }

            let closed =
                maybe_close(&tx, &meeting.uuid, req, &position, Some(&meeting), meeting.start_time_ms)?;
            tx.commit()?;

            Ok(AppendOutcome::Applied {
                last_update_serial: position.last_serial,
                last_update_time: position.last_time,
                closed,
            })
        }
        Batch::Lines(lines) => {
            let start_serial = lines[0].last_log_serial;
            match position.accept(start_serial) {
                Decision::Gap => {
                    warn!("Missed a chunk? Resend log file. {}", meeting.uuid);
                    return Ok(AppendOutcome::LogMismatch);
                }
                Decision::DuplicateIgnore => {
                    // The legacy stream is append-only and never rewritten;
                    // acknowledge with the current position and let the hub
                    // resend from there
                }
                Decision::Apply => {
                    let mut log = LegacyLog::open_or_create(data_dir, &meeting.uuid)
                        .map_err(|e| SyncError::Log(e.to_string()))?;
                    log.append(&lines)?;

                    // Batches may arrive unordered; the high-water mark is
                    // the batch maximum, not the final element
                    let top = lines
                        .iter()
                        .max_by_key(|l| l.last_log_serial)
                        .unwrap_or(&lines[0]);
                    position.advance(top.last_log_serial, top.last_log_time);
                }
            }

            let tx = conn.transaction()?;
            if let (Some(serial), Some(time)) = (position.last_serial, position.last_time) {
                tx.execute(&meetings::update_position(&meeting.uuid, serial, time), [])?;
            }
            let closed =
                maybe_close(&tx, &meeting.uuid, req, &position, Some(&meeting), meeting.start_time_ms)?;
            tx.commit()?;

            Ok(AppendOutcome::Applied {
                last_update_serial: position.last_serial,
                last_update_time: position.last_time,
                closed,
            })
        }
    }
}

/// Shared completion fields across the two request bodies
trait CompletionFields {
    fn is_complete(&self) -> bool;
    fn end_time(&self) -> Option<&str>;
    fn ending_method(&self) -> Option<&str>;
}

impl CompletionFields for CreateMeetingRequest {
    fn is_complete(&self) -> bool {
        self.is_complete
    }
    fn end_time(&self) -> Option<&str> {
        self.end_time.as_deref()
    }
    fn ending_method(&self) -> Option<&str> {
        self.ending_method.as_deref()
    }
}

impl CompletionFields for AppendRequest {
    fn is_complete(&self) -> bool {
        self.is_complete
    }
    fn end_time(&self) -> Option<&str> {
        self.end_time.as_deref()
    }
    fn ending_method(&self) -> Option<&str> {
        self.ending_method.as_deref()
    }
}

/// Run the close transition when the request signals completion. Returns the
/// analysis summary only when this request moved the meeting to Closed.
fn maybe_close<R: CompletionFields>(
    conn: &Connection,
    uuid: &str,
    req: &R,
    position: &Position,
    existing: Option<&MeetingRow>,
    start_time_ms: i64,
) -> Result<Option<MeetingSummary>, SyncError> {
    if !req.is_complete() {
        return Ok(None);
    }

    let already_complete = existing.map_or(false, |m| m.is_complete);

    let end_time_ms = lifecycle::close_meeting(
        conn,
        uuid,
        req.end_time(),
        req.ending_method(),
        position.last_time,
    )?;

    if already_complete {
        return Ok(None);
    }

    let (project_key, hub_uuid) = match existing {
        Some(m) => (m.project_key.clone(), m.hub_uuid.clone()),
        None => {
            // Created in this request; the caller's route and header are the
            // owners
            let row = get_meeting(conn, uuid)?.ok_or_else(|| SyncError::UnknownMeeting {
                uuid: uuid.to_string(),
            })?;
            (row.project_key, row.hub_uuid)
        }
    };

    Ok(Some(MeetingSummary {
        uuid: uuid.to_string(),
        project_key,
        hub_uuid,
        start_time_ms,
        end_time_ms,
        ending_method: req.ending_method().map(|s| s.to_string()),
    }))
}
