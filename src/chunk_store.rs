//! Idempotent storage for v2 chunk records, keyed by `(meeting, log_index)`.
//!
//! Retransmission of an index overwrites the stored chunk in place; the
//! `final_chunk_index` pointer on the meeting row is maintained incrementally
//! so the hot path never scans the chunks table for a maximum.

use rusqlite::Connection;

use crate::log_entry::ChunkRecord;
use crate::queries::chunks;

/// Upsert one chunk. Caller must have resolved the meeting first; an unknown
/// meeting uuid here trips the foreign key and is a caller bug, not a
/// runtime condition.
pub fn upsert_chunk(
    conn: &Connection,
    meeting_uuid: &str,
    chunk: &ChunkRecord,
) -> rusqlite::Result<()> {
    let data = chunk.data.to_string();
    conn.execute(
        &chunks::upsert(
            meeting_uuid,
            chunk.log_index,
            &chunk.event,
            chunk.log_timestamp,
            &data,
        ),
        [],
    )?;
    Ok(())
}

/// Move the meeting's final-chunk pointer forward if `log_index` is a new
/// maximum. A retransmitted lower index leaves the pointer untouched.
pub fn bump_final_chunk(
    conn: &Connection,
    meeting_uuid: &str,
    log_index: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE meetings SET final_chunk_index = ?1
         WHERE uuid = ?2
           AND (final_chunk_index IS NULL OR final_chunk_index < ?1)",
        rusqlite::params![log_index, meeting_uuid],
    )?;
    Ok(())
}

/// The chunk with the highest index applied so far, if any
pub fn final_chunk(
    conn: &Connection,
    meeting_uuid: &str,
) -> rusqlite::Result<Option<ChunkRecord>> {
    let final_index: Option<i64> = conn.query_row(
        "SELECT final_chunk_index FROM meetings WHERE uuid = ?1",
        [meeting_uuid],
        |row| row.get(0),
    )?;

    let final_index = match final_index {
        Some(idx) => idx,
        None => return Ok(None),
    };

    let chunk = conn.query_row(
        &chunks::select_by_log_index(meeting_uuid, final_index),
        [],
        |row| {
            let data: String = row.get(3)?;
            Ok(ChunkRecord {
                log_index: row.get(0)?,
                event: row.get(1)?,
                log_timestamp: row.get(2)?,
                // The tracked serial is not stored per chunk; the pointer is
                // index-based
                log_serial: row.get(0)?,
                data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
            })
        },
    )?;

    Ok(Some(chunk))
}
