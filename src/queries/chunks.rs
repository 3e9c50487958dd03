use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};

use crate::schema::Chunks;

/// INSERT INTO chunks (meeting_uuid, log_index, event, log_timestamp, data)
/// VALUES (?, ?, ?, ?, ?)
/// ON CONFLICT (meeting_uuid, log_index) DO UPDATE SET event = ..., log_timestamp = ..., data = ...
/// Retransmission of an already-seen index overwrites in place, never duplicates
pub fn upsert(
    meeting_uuid: &str,
    log_index: i64,
    event: &str,
    log_timestamp: f64,
    data: &str,
) -> String {
    Query::insert()
        .into_table(Chunks::Table)
        .columns([
            Chunks::MeetingUuid,
            Chunks::LogIndex,
            Chunks::Event,
            Chunks::LogTimestamp,
            Chunks::Data,
        ])
        .values_panic([
            meeting_uuid.into(),
            log_index.into(),
            event.into(),
            log_timestamp.into(),
            data.into(),
        ])
        .on_conflict(
            OnConflict::columns([Chunks::MeetingUuid, Chunks::LogIndex])
                .update_columns([Chunks::Event, Chunks::LogTimestamp, Chunks::Data])
                .to_owned(),
        )
        .to_string(SqliteQueryBuilder)
}

/// SELECT log_index, event, log_timestamp, data FROM chunks
/// WHERE meeting_uuid = ? AND log_index = ?
pub fn select_by_log_index(meeting_uuid: &str, log_index: i64) -> String {
    Query::select()
        .columns([Chunks::LogIndex, Chunks::Event, Chunks::LogTimestamp, Chunks::Data])
        .from(Chunks::Table)
        .and_where(Expr::col(Chunks::MeetingUuid).eq(meeting_uuid))
        .and_where(Expr::col(Chunks::LogIndex).eq(log_index))
        .to_string(SqliteQueryBuilder)
}
