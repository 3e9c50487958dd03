use sea_query::{Expr, Order, Query, SqliteQueryBuilder};

use crate::schema::Meetings;

/// INSERT INTO meetings (uuid, project_key, hub_uuid, start_time_ms, location, meeting_type, description)
/// VALUES (?, ?, ?, ?, ?, ?, ?)
pub fn insert(
    uuid: &str,
    project_key: &str,
    hub_uuid: &str,
    start_time_ms: i64,
    location: &str,
    meeting_type: &str,
    description: &str,
) -> String {
    Query::insert()
        .into_table(Meetings::Table)
        .columns([
            Meetings::Uuid,
            Meetings::ProjectKey,
            Meetings::HubUuid,
            Meetings::StartTimeMs,
            Meetings::Location,
            Meetings::MeetingType,
            Meetings::Description,
        ])
        .values_panic([
            uuid.into(),
            project_key.into(),
            hub_uuid.into(),
            start_time_ms.into(),
            location.into(),
            meeting_type.into(),
            description.into(),
        ])
        .to_string(SqliteQueryBuilder)
}

/// UPDATE meetings SET start_time_ms = ?, location = ?, meeting_type = ?, description = ?
/// WHERE uuid = ?
/// Used when a hub re-attaches to an existing meeting with refreshed info
pub fn update_details(
    uuid: &str,
    start_time_ms: i64,
    location: &str,
    meeting_type: &str,
    description: &str,
) -> String {
    Query::update()
        .table(Meetings::Table)
        .value(Meetings::StartTimeMs, start_time_ms)
        .value(Meetings::Location, location)
        .value(Meetings::MeetingType, meeting_type)
        .value(Meetings::Description, description)
        .and_where(Expr::col(Meetings::Uuid).eq(uuid))
        .to_string(SqliteQueryBuilder)
}

/// UPDATE meetings SET last_update_serial = ?, last_update_time = ? WHERE uuid = ?
pub fn update_position(uuid: &str, serial: i64, time: f64) -> String {
    Query::update()
        .table(Meetings::Table)
        .value(Meetings::LastUpdateSerial, serial)
        .value(Meetings::LastUpdateTime, time)
        .and_where(Expr::col(Meetings::Uuid).eq(uuid))
        .to_string(SqliteQueryBuilder)
}

/// UPDATE meetings SET is_complete = 1, end_time_ms = ?, ending_method = ? WHERE uuid = ?
pub fn close(uuid: &str, end_time_ms: i64, ending_method: Option<&str>) -> String {
    Query::update()
        .table(Meetings::Table)
        .value(Meetings::IsComplete, 1)
        .value(Meetings::EndTimeMs, end_time_ms)
        .value(Meetings::EndingMethod, ending_method.map(|s| s.to_string()))
        .and_where(Expr::col(Meetings::Uuid).eq(uuid))
        .to_string(SqliteQueryBuilder)
}

/// SELECT project_key, hub_uuid, start_time_ms, end_time_ms, is_complete,
///        last_update_serial, last_update_time, final_chunk_index
/// FROM meetings WHERE uuid = ?
pub fn select_by_uuid(uuid: &str) -> String {
    Query::select()
        .columns([
            Meetings::ProjectKey,
            Meetings::HubUuid,
            Meetings::StartTimeMs,
            Meetings::EndTimeMs,
            Meetings::IsComplete,
            Meetings::LastUpdateSerial,
            Meetings::LastUpdateTime,
            Meetings::FinalChunkIndex,
        ])
        .from(Meetings::Table)
        .and_where(Expr::col(Meetings::Uuid).eq(uuid))
        .to_string(SqliteQueryBuilder)
}

/// SELECT uuid, hub_uuid, start_time_ms, end_time_ms, location, meeting_type,
///        description, is_complete, last_update_serial, last_update_time
/// FROM meetings WHERE project_key = ? ORDER BY start_time_ms
pub fn select_by_project(project_key: &str) -> String {
    Query::select()
        .columns([
            Meetings::Uuid,
            Meetings::HubUuid,
            Meetings::StartTimeMs,
            Meetings::EndTimeMs,
            Meetings::Location,
            Meetings::MeetingType,
            Meetings::Description,
            Meetings::IsComplete,
            Meetings::LastUpdateSerial,
            Meetings::LastUpdateTime,
        ])
        .from(Meetings::Table)
        .and_where(Expr::col(Meetings::ProjectKey).eq(project_key))
        .order_by(Meetings::StartTimeMs, Order::Asc)
        .to_string(SqliteQueryBuilder)
}

/// SELECT uuid FROM meetings WHERE last_update_serial IS NULL ORDER BY uuid
/// Meetings whose position state is cold (candidates for log recovery)
pub fn select_without_position() -> String {
    Query::select()
        .column(Meetings::Uuid)
        .from(Meetings::Table)
        .and_where(Expr::col(Meetings::LastUpdateSerial).is_null())
        .order_by(Meetings::Uuid, Order::Asc)
        .to_string(SqliteQueryBuilder)
}
