use rusqlite::Connection;
use std::path::Path;

use crate::constants::SCHEMA_VERSION;
use crate::queries::ddl;

/// Open a file-based database connection for production use
/// Enables WAL mode and foreign keys
pub fn open_database_connection(db_path: &Path) -> Result<Connection, Box<dyn std::error::Error>> {
    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

/// Create all tables and indexes (idempotent)
pub fn init_database_schema(conn: &Connection) -> Result<(), Box<dyn std::error::Error>> {
    conn.execute(&ddl::create_projects_table(), [])?;
    conn.execute(&ddl::create_hubs_table(), [])?;
    conn.execute(&ddl::create_meetings_table(), [])?;
    conn.execute(&ddl::create_chunks_table(), [])?;
    conn.execute(&ddl::create_chunks_meeting_log_index(), [])?;
    conn.execute(&ddl::create_meetings_project_index(), [])?;
    conn.execute(&ddl::create_meetings_hub_index(), [])?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO metadata (key, value) VALUES ('version', ?1)",
        [SCHEMA_VERSION],
    )?;
    Ok(())
}

/// Verify the database was created by a compatible version of this collector
pub fn check_schema_version(conn: &Connection) -> Result<(), Box<dyn std::error::Error>> {
    let version: String = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = 'version'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| format!("Failed to read version from metadata: {}", e))?;

    if version != SCHEMA_VERSION {
        return Err(format!(
            "Unsupported database version: '{}'. This application only supports version '{}'",
            version, SCHEMA_VERSION
        )
        .into());
    }
    Ok(())
}

/// Create an in-memory database connection with the full schema, for testing
pub fn create_test_connection_in_memory() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    conn.execute("PRAGMA foreign_keys = ON", [])
        .expect("Failed to enable foreign keys");
    init_database_schema(&conn).expect("Failed to initialize schema");
    conn
}
