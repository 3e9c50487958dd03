// End-to-end tests against a live collector server on an ephemeral port,
// driven with the same blocking HTTP client the hubs use.

use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

use collect_meeting_logs::db;
use collect_meeting_logs::serve::{build_router, AppState};
use collect_meeting_logs::MeetingLocks;

/// Start a collector backed by a temp database and data dir. The TempDir
/// must outlive the test body.
async fn start_test_server(temp_dir: &TempDir) -> (String, tokio::task::JoinHandle<()>) {
    let db_path = temp_dir.path().join("meetings.db");
    let data_dir = temp_dir.path().join("logs");
    std::fs::create_dir_all(&data_dir).unwrap();

    let conn = db::open_database_connection(&db_path).unwrap();
    db::init_database_schema(&conn).unwrap();
    drop(conn);

    let state = Arc::new(AppState {
        db_path,
        data_dir,
        post_meeting_analysis: false,
        analysis_url: None,
        meeting_locks: MeetingLocks::default(),
    });
    let app = build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("http://{}", addr);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

    (url, handle)
}

fn register_hub(client: &reqwest::blocking::Client, url: &str, hub_uuid: &str) {
    let resp = client
        .put(format!("{}/api/projects/proj-1/hubs", url))
        .json(&serde_json::json!({"uuid": hub_uuid, "name": "Test Hub"}))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 201);
}

fn create_meeting(
    client: &reqwest::blocking::Client,
    url: &str,
    hub_uuid: &str,
    meeting_uuid: &str,
) -> serde_json::Value {
    let resp = client
        .put(format!("{}/api/projects/proj-1/meetings", url))
        .header("X-Hub-Uuid", hub_uuid)
        .json(&serde_json::json!({
            "uuid": meeting_uuid,
            "start_time": "2016-06-20 12:00:00",
            "location": "room 4",
            "type": "standup",
            "description": "",
        }))
        .send()
        .unwrap();
    assert_eq!(resp.status(), 200);
    resp.json().unwrap()
}

fn chunk(index: i64, timestamp: f64) -> serde_json::Value {
    serde_json::json!({
        "event": "audio received",
        "log_index": index,
        "log_serial": index,
        "log_timestamp": timestamp,
        "data": {"samples": [1, 2, 3]},
    })
}

#[tokio::test]
async fn test_hub_registration_and_identity() {
    let temp_dir = TempDir::new().unwrap();
    let (url, _handle) = start_test_server(&temp_dir).await;

    let result = tokio::task::spawn_blocking(move || {
        let client = reqwest::blocking::Client::new();
        register_hub(&client, &url, "hub-1");

        // Second registration with the same uuid is a conflict
        let resp = client
            .put(format!("{}/api/projects/proj-1/hubs", url))
            .json(&serde_json::json!({"uuid": "hub-1", "name": "Imposter"}))
            .send()
            .unwrap();
        assert_eq!(resp.status(), 409);

        let resp = client
            .get(format!("{}/api/projects/proj-1/hubs", url))
            .header("X-Hub-Uuid", "hub-1")
            .send()
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().unwrap();
        assert_eq!(body["uuid"], "hub-1");
        assert_eq!(body["project_key"], "proj-1");
    })
    .await;
    result.unwrap();
}

#[tokio::test]
async fn test_missing_hub_header_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let (url, _handle) = start_test_server(&temp_dir).await;

    let result = tokio::task::spawn_blocking(move || {
        let client = reqwest::blocking::Client::new();
        register_hub(&client, &url, "hub-1");

        let resp = client
            .put(format!("{}/api/projects/proj-1/meetings", url))
            .json(&serde_json::json!({
                "uuid": "meeting-1",
                "start_time": "2016-06-20 12:00:00",
            }))
            .send()
            .unwrap();
        assert_eq!(resp.status(), 400);
    })
    .await;
    result.unwrap();
}

#[tokio::test]
async fn test_meeting_put_with_embedded_log_seeds_position() {
    let temp_dir = TempDir::new().unwrap();
    let (url, _handle) = start_test_server(&temp_dir).await;

    let result = tokio::task::spawn_blocking(move || {
        let client = reqwest::blocking::Client::new();
        register_hub(&client, &url, "hub-1");

        let log = "{\"type\": \"audio received\", \"last_log_serial\": 7, \"last_log_time\": 55.5}\n";
        let resp = client
            .put(format!("{}/api/projects/proj-1/meetings", url))
            .header("X-Hub-Uuid", "hub-1")
            .json(&serde_json::json!({
                "uuid": "meeting-1",
                "start_time": "2016-06-20 12:00:00",
                "log": log,
            }))
            .send()
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().unwrap();
        assert_eq!(body["detail"], "meeting created");
        assert_eq!(body["last_update_serial"], 7);
        assert_eq!(body["last_update_time"], 55.5);
    })
    .await;
    result.unwrap();
}

#[tokio::test]
async fn test_chunk_post_success_and_log_mismatch() {
    let temp_dir = TempDir::new().unwrap();
    let (url, _handle) = start_test_server(&temp_dir).await;

    let result = tokio::task::spawn_blocking(move || {
        let client = reqwest::blocking::Client::new();
        register_hub(&client, &url, "hub-1");
        create_meeting(&client, &url, "hub-1", "meeting-1");

        let resp = client
            .post(format!("{}/api/projects/proj-1/meetings", url))
            .header("X-Hub-Uuid", "hub-1")
            .json(&serde_json::json!({
                "uuid": "meeting-1",
                "chunks": [chunk(0, 100.0), chunk(1, 101.0), chunk(2, 102.0)],
            }))
            .send()
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["last_update_serial"], 2);

        // Serial 3 never arrives; the next batch starts at 4
        let resp = client
            .post(format!("{}/api/projects/proj-1/meetings", url))
            .header("X-Hub-Uuid", "hub-1")
            .json(&serde_json::json!({
                "uuid": "meeting-1",
                "chunks": [chunk(4, 104.0)],
            }))
            .send()
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().unwrap();
        assert_eq!(body["status"], "log mismatch");

        // An empty batch is acknowledged distinctly
        let resp = client
            .post(format!("{}/api/projects/proj-1/meetings", url))
            .header("X-Hub-Uuid", "hub-1")
            .json(&serde_json::json!({"uuid": "meeting-1", "chunks": []}))
            .send()
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().unwrap();
        assert_eq!(body["status"], "no data");
    })
    .await;
    result.unwrap();
}

#[tokio::test]
async fn test_post_from_second_hub_is_unauthorized() {
    let temp_dir = TempDir::new().unwrap();
    let (url, _handle) = start_test_server(&temp_dir).await;

    let result = tokio::task::spawn_blocking(move || {
        let client = reqwest::blocking::Client::new();
        register_hub(&client, &url, "hub-1");
        register_hub(&client, &url, "hub-2");
        create_meeting(&client, &url, "hub-1", "meeting-1");

        let resp = client
            .post(format!("{}/api/projects/proj-1/meetings", url))
            .header("X-Hub-Uuid", "hub-2")
            .json(&serde_json::json!({
                "uuid": "meeting-1",
                "chunks": [chunk(0, 100.0)],
            }))
            .send()
            .unwrap();
        assert_eq!(resp.status(), 401);
        let body: serde_json::Value = resp.json().unwrap();
        assert_eq!(body["error"], "Unauthorized");
    })
    .await;
    result.unwrap();
}

#[tokio::test]
async fn test_project_record_lists_hubs_and_meetings() {
    let temp_dir = TempDir::new().unwrap();
    let (url, _handle) = start_test_server(&temp_dir).await;

    let result = tokio::task::spawn_blocking(move || {
        let client = reqwest::blocking::Client::new();
        register_hub(&client, &url, "hub-1");
        create_meeting(&client, &url, "hub-1", "meeting-1");
        create_meeting(&client, &url, "hub-1", "meeting-2");

        let resp = client
            .get(format!("{}/api/projects", url))
            .header("X-Hub-Uuid", "hub-1")
            .send()
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().unwrap();
        assert_eq!(body["key"], "proj-1");
        assert_eq!(body["hubs"].as_array().unwrap().len(), 1);
        assert_eq!(body["meetings"].as_array().unwrap().len(), 2);

        // Meetings are also listable by project route
        let resp = client
            .get(format!("{}/api/projects/proj-1/meetings", url))
            .send()
            .unwrap();
        assert_eq!(resp.status(), 200);
        let listed: serde_json::Value = resp.json().unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 2);

        let resp = client
            .get(format!("{}/api/projects/nope/meetings", url))
            .send()
            .unwrap();
        assert_eq!(resp.status(), 404);
    })
    .await;
    result.unwrap();
}
