use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, put},
    Router,
};
use log::error;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc as StdArc;
use tower_http::cors::{Any, CorsLayer};

use crate::analysis;
use crate::config::ServerConfig;
use crate::constants::HUB_UUID_HEADER;
use crate::queries::{hubs, meetings, projects};
use crate::sync::{self, AppendOutcome, AppendRequest, CreateMeetingRequest, SyncError};
use crate::{get_meeting_lock, MeetingLocks};

// State for collector API handlers
pub struct AppState {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub post_meeting_analysis: bool,
    pub analysis_url: Option<String>,
    pub meeting_locks: MeetingLocks,
}

impl AppState {
    fn open(&self) -> Result<rusqlite::Connection, Box<dyn std::error::Error>> {
        crate::db::open_database_connection(&self.db_path)
    }
}

/// Serve the collector API
pub fn serve_collector(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.data_dir).map_err(|e| {
        format!(
            "Failed to create data directory '{}': {}",
            config.data_dir.display(),
            e
        )
    })?;

    let conn = crate::db::open_database_connection(&config.database)?;
    crate::db::init_database_schema(&conn)?;
    crate::db::check_schema_version(&conn)?;
    drop(conn);

    let port = config.port;
    println!("Starting collector for: {}", config.database.display());
    println!("Meeting logs under: {}", config.data_dir.display());
    println!("Listening on: http://[::]:{} (IPv4 + IPv6)", port);
    println!("Endpoints:");
    println!("  GET /health  - Liveness check");
    println!("  GET /api/projects  - Project record for the requesting hub");
    println!("  PUT /api/projects/:key/hubs  - Register a hub");
    println!("  GET /api/projects/:key/hubs  - Requesting hub's identity");
    println!("  PUT /api/projects/:key/meetings  - Create or re-attach a meeting");
    println!("  GET /api/projects/:key/meetings  - List meetings with sync state");
    println!("  POST /api/projects/:key/meetings  - Append a log batch");

    // Create tokio runtime and run server
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let app_state = StdArc::new(AppState {
            db_path: config.database.clone(),
            data_dir: config.data_dir.clone(),
            post_meeting_analysis: config.post_meeting_analysis,
            analysis_url: config.analysis_url.clone(),
            meeting_locks: MeetingLocks::default(),
        });

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = build_router(app_state).layer(cors);

        let listener = tokio::net::TcpListener::bind(format!("[::]:{}", port))
            .await
            .map_err(|e| format!("Failed to bind to port {}: {}", port, e))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| format!("Server error: {}", e))?;

        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Route table, separated out so tests can mount it on an ephemeral port
pub fn build_router(state: StdArc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/projects", get(project_handler))
        .route(
            "/api/projects/{project_key}/hubs",
            put(hub_register_handler).get(hub_identity_handler),
        )
        .route(
            "/api/projects/{project_key}/meetings",
            put(meeting_put_handler)
                .get(meetings_list_handler)
                .post(meeting_post_handler),
        )
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Pull the hub identity header; every hub-facing endpoint requires it
fn hub_uuid_from_headers(headers: &HeaderMap) -> Result<String, (StatusCode, axum::Json<serde_json::Value>)> {
    headers
        .get(HUB_UUID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or((
            StatusCode::BAD_REQUEST,
            axum::Json(serde_json::json!({"error": "X-Hub-Uuid header is required"})),
        ))
}

fn sync_error_response(e: SyncError) -> (StatusCode, axum::Json<serde_json::Value>) {
    match e {
        SyncError::Malformed(_) | SyncError::Close(_) => (
            StatusCode::BAD_REQUEST,
            axum::Json(serde_json::json!({"error": e.to_string()})),
        ),
        // Deliberately content-free; a rejected hub learns nothing about
        // other hubs' meetings
        SyncError::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({"error": "Unauthorized"})),
        ),
        SyncError::UnknownMeeting { .. } => (
            StatusCode::NOT_FOUND,
            axum::Json(serde_json::json!({"error": e.to_string()})),
        ),
        SyncError::Db(_) | SyncError::Io(_) | SyncError::Log(_) => {
            error!("Sync request failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}

/// GET /api/projects - the requesting hub's project with its hubs and
/// meetings
async fn project_handler(
    State(state): State<StdArc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let hub_uuid = match hub_uuid_from_headers(&headers) {
        Ok(uuid) => uuid,
        Err(resp) => return resp.into_response(),
    };

    let conn = match state.open() {
        Ok(conn) => conn,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({"error": format!("Failed to open database: {}", e)})),
            )
                .into_response();
        }
    };

    use rusqlite::OptionalExtension;
    let project_key: Option<String> = match conn
        .query_row(&hubs::select_by_uuid(&hub_uuid), [], |row| row.get(1))
        .optional()
    {
        Ok(key) => key,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({"error": format!("Database error: {}", e)})),
            )
                .into_response();
        }
    };

    let project_key = match project_key {
        Some(key) => key,
        None => {
            return (
                StatusCode::NOT_FOUND,
                axum::Json(serde_json::json!({"error": format!("Hub '{}' not found", hub_uuid)})),
            )
                .into_response();
        }
    };

    let name: String = match conn.query_row(&projects::select_by_key(&project_key), [], |row| {
        row.get(0)
    }) {
        Ok(name) => name,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({"error": format!("Database error: {}", e)})),
            )
                .into_response();
        }
    };

    let hub_rows = match collect_hubs(&conn, &project_key) {
        Ok(rows) => rows,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({"error": format!("Database error: {}", e)})),
            )
                .into_response();
        }
    };

    let meeting_rows = match collect_meetings(&conn, &project_key) {
        Ok(rows) => rows,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({"error": format!("Database error: {}", e)})),
            )
                .into_response();
        }
    };

    (
        StatusCode::OK,
        axum::Json(serde_json::json!({
            "key": project_key,
            "name": name,
            "hubs": hub_rows,
            "meetings": meeting_rows,
        })),
    )
        .into_response()
}

fn collect_hubs(
    conn: &rusqlite::Connection,
    project_key: &str,
) -> rusqlite::Result<Vec<serde_json::Value>> {
    let mut stmt = conn.prepare(&hubs::select_by_project(project_key))?;
    let rows = stmt.query_map([], |row| {
        Ok(serde_json::json!({
            "uuid": row.get::<_, String>(0)?,
            "name": row.get::<_, String>(1)?,
        }))
    })?;
    rows.collect()
}

fn collect_meetings(
    conn: &rusqlite::Connection,
    project_key: &str,
) -> rusqlite::Result<Vec<serde_json::Value>> {
    let mut stmt = conn.prepare(&meetings::select_by_project(project_key))?;
    let rows = stmt.query_map([], |row| {
        Ok(serde_json::json!({
            "uuid": row.get::<_, String>(0)?,
            "hub_uuid": row.get::<_, String>(1)?,
            "start_time_ms": row.get::<_, i64>(2)?,
            "end_time_ms": row.get::<_, Option<i64>>(3)?,
            "location": row.get::<_, String>(4)?,
            "type": row.get::<_, String>(5)?,
            "description": row.get::<_, String>(6)?,
            "is_complete": row.get::<_, i64>(7)? != 0,
            "last_update_serial": row.get::<_, Option<i64>>(8)?,
            "last_update_time": row.get::<_, Option<f64>>(9)?,
        }))
    })?;
    rows.collect()
}

#[derive(Debug, Deserialize)]
struct RegisterHubRequest {
    uuid: String,
    #[serde(default)]
    name: String,
}

/// PUT /api/projects/{project_key}/hubs - register a hub under the routed
/// project. The project row is created on first registration.
async fn hub_register_handler(
    State(state): State<StdArc<AppState>>,
    Path(project_key): Path<String>,
    axum::Json(req): axum::Json<RegisterHubRequest>,
) -> impl IntoResponse {
    let conn = match state.open() {
        Ok(conn) => conn,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({"error": format!("Failed to open database: {}", e)})),
            )
                .into_response();
        }
    };

    if let Err(e) = conn.execute(&projects::insert_or_ignore(&project_key, &project_key), []) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(serde_json::json!({"error": format!("Database error: {}", e)})),
        )
            .into_response();
    }

    match conn.execute(&hubs::insert(&req.uuid, &req.name, &project_key), []) {
        Ok(_) => (
            StatusCode::CREATED,
            axum::Json(serde_json::json!({
                "uuid": req.uuid,
                "name": req.name,
                "project_key": project_key,
            })),
        )
            .into_response(),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            (
                StatusCode::CONFLICT,
                axum::Json(
                    serde_json::json!({"error": format!("Hub '{}' is already registered", req.uuid)}),
                ),
            )
                .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(serde_json::json!({"error": format!("Database error: {}", e)})),
        )
            .into_response(),
    }
}

/// GET /api/projects/{project_key}/hubs - the requesting hub's own identity
/// record
async fn hub_identity_handler(
    State(state): State<StdArc<AppState>>,
    Path(project_key): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let hub_uuid = match hub_uuid_from_headers(&headers) {
        Ok(uuid) => uuid,
        Err(resp) => return resp.into_response(),
    };

    let conn = match state.open() {
        Ok(conn) => conn,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({"error": format!("Failed to open database: {}", e)})),
            )
                .into_response();
        }
    };

    use rusqlite::OptionalExtension;
    let row: Option<(String, String)> = match conn
        .query_row(&hubs::select_by_uuid(&hub_uuid), [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .optional()
    {
        Ok(row) => row,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({"error": format!("Database error: {}", e)})),
            )
                .into_response();
        }
    };

    match row {
        Some((name, key)) if key == project_key => (
            StatusCode::OK,
            axum::Json(serde_json::json!({
                "uuid": hub_uuid,
                "name": name,
                "project_key": key,
            })),
        )
            .into_response(),
        _ => (
            StatusCode::NOT_FOUND,
            axum::Json(serde_json::json!({"error": format!("Hub '{}' not found", hub_uuid)})),
        )
            .into_response(),
    }
}

/// PUT /api/projects/{project_key}/meetings - create or re-attach
async fn meeting_put_handler(
    State(state): State<StdArc<AppState>>,
    Path(project_key): Path<String>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<CreateMeetingRequest>,
) -> impl IntoResponse {
    let hub_uuid = match hub_uuid_from_headers(&headers) {
        Ok(uuid) => uuid,
        Err(resp) => return resp.into_response(),
    };

    let outcome = {
        let meeting_lock = get_meeting_lock(&state.meeting_locks, &req.uuid);
        let _guard = meeting_lock.lock().unwrap();

        let mut conn = match state.open() {
            Ok(conn) => conn,
            Err(e) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    axum::Json(
                        serde_json::json!({"error": format!("Failed to open database: {}", e)}),
                    ),
                )
                    .into_response();
            }
        };

        match sync::create_meeting(&mut conn, &state.data_dir, &project_key, &hub_uuid, &req) {
            Ok(outcome) => outcome,
            Err(e) => return sync_error_response(e).into_response(),
        }
    };

    if let Some(summary) = outcome.closed {
        if state.post_meeting_analysis {
            if let Some(url) = &state.analysis_url {
                analysis::notify_meeting_complete(url.clone(), summary);
            }
        }
    }

    let detail = if outcome.created {
        "meeting created"
    } else {
        "meeting updated"
    };
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({
            "detail": detail,
            "uuid": req.uuid,
            "last_update_serial": outcome.last_update_serial,
            "last_update_time": outcome.last_update_time,
        })),
    )
        .into_response()
}

/// GET /api/projects/{project_key}/meetings - meetings with sync state
async fn meetings_list_handler(
    State(state): State<StdArc<AppState>>,
    Path(project_key): Path<String>,
) -> impl IntoResponse {
    let conn = match state.open() {
        Ok(conn) => conn,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({"error": format!("Failed to open database: {}", e)})),
            )
                .into_response();
        }
    };

    use rusqlite::OptionalExtension;
    let known: Option<i64> = match conn
        .query_row(&projects::exists(&project_key), [], |row| row.get(0))
        .optional()
    {
        Ok(known) => known,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(serde_json::json!({"error": format!("Database error: {}", e)})),
            )
                .into_response();
        }
    };
    if known.is_none() {
        return (
            StatusCode::NOT_FOUND,
            axum::Json(
                serde_json::json!({"error": format!("Project '{}' not found", project_key)}),
            ),
        )
            .into_response();
    }

    match collect_meetings(&conn, &project_key) {
        Ok(rows) => (StatusCode::OK, axum::Json(rows)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(serde_json::json!({"error": format!("Database error: {}", e)})),
        )
            .into_response(),
    }
}

/// POST /api/projects/{project_key}/meetings - append one batch
async fn meeting_post_handler(
    State(state): State<StdArc<AppState>>,
    Path(project_key): Path<String>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<AppendRequest>,
) -> impl IntoResponse {
    let hub_uuid = match hub_uuid_from_headers(&headers) {
        Ok(uuid) => uuid,
        Err(resp) => return resp.into_response(),
    };

    let outcome = {
        let meeting_lock = get_meeting_lock(&state.meeting_locks, &req.uuid);
        let _guard = meeting_lock.lock().unwrap();

        let mut conn = match state.open() {
            Ok(conn) => conn,
            Err(e) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    axum::Json(
                        serde_json::json!({"error": format!("Failed to open database: {}", e)}),
                    ),
                )
                    .into_response();
            }
        };

        match sync::append_batch(&mut conn, &state.data_dir, &project_key, &hub_uuid, &req) {
            Ok(outcome) => outcome,
            Err(e) => return sync_error_response(e).into_response(),
        }
    };

    match outcome {
        AppendOutcome::NoData => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"status": "no data", "uuid": req.uuid})),
        )
            .into_response(),
        AppendOutcome::LogMismatch => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"status": "log mismatch", "uuid": req.uuid})),
        )
            .into_response(),
        AppendOutcome::Applied {
            last_update_serial,
            last_update_time,
            closed,
        } => {
            if let Some(summary) = closed {
                if state.post_meeting_analysis {
                    if let Some(url) = &state.analysis_url {
                        analysis::notify_meeting_complete(url.clone(), summary);
                    }
                }
            }
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({
                    "status": "success",
                    "uuid": req.uuid,
                    "last_update_serial": last_update_serial,
                    "last_update_time": last_update_time,
                })),
            )
                .into_response()
        }
    }
}
