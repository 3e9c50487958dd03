use sea_query::{ColumnDef, ForeignKey, ForeignKeyAction, Index, SqliteQueryBuilder, Table};

use crate::schema::{Chunks, Hubs, Meetings, Projects};

/// CREATE TABLE IF NOT EXISTS projects (key TEXT PRIMARY KEY, name TEXT NOT NULL)
pub fn create_projects_table() -> String {
    Table::create()
        .table(Projects::Table)
        .if_not_exists()
        .col(ColumnDef::new(Projects::Key).string().primary_key())
        .col(ColumnDef::new(Projects::Name).string().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS hubs (
///     uuid TEXT PRIMARY KEY,
///     name TEXT NOT NULL,
///     project_key TEXT NOT NULL REFERENCES projects(key)
/// )
pub fn create_hubs_table() -> String {
    Table::create()
        .table(Hubs::Table)
        .if_not_exists()
        .col(ColumnDef::new(Hubs::Uuid).string().primary_key())
        .col(ColumnDef::new(Hubs::Name).string().not_null())
        .col(ColumnDef::new(Hubs::ProjectKey).string().not_null())
        .foreign_key(
            ForeignKey::create()
                .from(Hubs::Table, Hubs::ProjectKey)
                .to(Projects::Table, Projects::Key),
        )
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS meetings (
///     uuid TEXT PRIMARY KEY,
///     project_key TEXT NOT NULL REFERENCES projects(key),
///     hub_uuid TEXT NOT NULL REFERENCES hubs(uuid),
///     start_time_ms INTEGER NOT NULL,
///     end_time_ms INTEGER,
///     location TEXT,
///     meeting_type TEXT,
///     description TEXT,
///     is_complete INTEGER NOT NULL DEFAULT 0,
///     ending_method TEXT,
///     last_update_serial INTEGER,
///     last_update_time REAL,
///     final_chunk_index INTEGER
/// )
pub fn create_meetings_table() -> String {
    Table::create()
        .table(Meetings::Table)
        .if_not_exists()
        .col(ColumnDef::new(Meetings::Uuid).string().primary_key())
        .col(ColumnDef::new(Meetings::ProjectKey).string().not_null())
        .col(ColumnDef::new(Meetings::HubUuid).string().not_null())
        .col(ColumnDef::new(Meetings::StartTimeMs).big_integer().not_null())
        .col(ColumnDef::new(Meetings::EndTimeMs).big_integer())
        .col(ColumnDef::new(Meetings::Location).string())
        .col(ColumnDef::new(Meetings::MeetingType).string())
        .col(ColumnDef::new(Meetings::Description).string())
        .col(
            ColumnDef::new(Meetings::IsComplete)
                .integer()
                .not_null()
                .default(0),
        )
        .col(ColumnDef::new(Meetings::EndingMethod).string())
        .col(ColumnDef::new(Meetings::LastUpdateSerial).big_integer())
        .col(ColumnDef::new(Meetings::LastUpdateTime).double())
        .col(ColumnDef::new(Meetings::FinalChunkIndex).big_integer())
        .foreign_key(
            ForeignKey::create()
                .from(Meetings::Table, Meetings::ProjectKey)
                .to(Projects::Table, Projects::Key),
        )
        .foreign_key(
            ForeignKey::create()
                .from(Meetings::Table, Meetings::HubUuid)
                .to(Hubs::Table, Hubs::Uuid),
        )
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS chunks (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     meeting_uuid TEXT NOT NULL REFERENCES meetings(uuid) ON DELETE CASCADE,
///     log_index INTEGER NOT NULL,
///     event TEXT NOT NULL,
///     log_timestamp REAL NOT NULL,
///     data TEXT NOT NULL
/// )
pub fn create_chunks_table() -> String {
    Table::create()
        .table(Chunks::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(Chunks::Id)
                .integer()
                .primary_key()
                .auto_increment(),
        )
        .col(ColumnDef::new(Chunks::MeetingUuid).string().not_null())
        .col(ColumnDef::new(Chunks::LogIndex).big_integer().not_null())
        .col(ColumnDef::new(Chunks::Event).string().not_null())
        .col(ColumnDef::new(Chunks::LogTimestamp).double().not_null())
        .col(ColumnDef::new(Chunks::Data).string().not_null())
        .foreign_key(
            ForeignKey::create()
                .from(Chunks::Table, Chunks::MeetingUuid)
                .to(Meetings::Table, Meetings::Uuid)
                .on_delete(ForeignKeyAction::Cascade),
        )
        .to_string(SqliteQueryBuilder)
}

/// CREATE UNIQUE INDEX IF NOT EXISTS idx_chunks_meeting_log_index ON chunks(meeting_uuid, log_index)
pub fn create_chunks_meeting_log_index() -> String {
    Index::create()
        .if_not_exists()
        .unique()
        .name("idx_chunks_meeting_log_index")
        .table(Chunks::Table)
        .col(Chunks::MeetingUuid)
        .col(Chunks::LogIndex)
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_meetings_project_key ON meetings(project_key)
pub fn create_meetings_project_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_meetings_project_key")
        .table(Meetings::Table)
        .col(Meetings::ProjectKey)
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_meetings_hub_uuid ON meetings(hub_uuid)
pub fn create_meetings_hub_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_meetings_hub_uuid")
        .table(Meetings::Table)
        .col(Meetings::HubUuid)
        .to_string(SqliteQueryBuilder)
}
