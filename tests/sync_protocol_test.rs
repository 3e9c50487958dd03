// Integration tests for the synchronization orchestrator: meeting creation,
// gap detection, idempotent retransmission, close transitions, and legacy
// stream recovery, all against a real SQLite schema and a temp data dir.

use rusqlite::Connection;
use serde_json::{json, Value};
use tempfile::TempDir;

use collect_meeting_logs::chunk_store;
use collect_meeting_logs::db::create_test_connection_in_memory;
use collect_meeting_logs::legacy_log;
use collect_meeting_logs::queries::{hubs, projects};
use collect_meeting_logs::sync::{
    self, AppendOutcome, AppendRequest, CreateMeetingRequest, SyncError,
};

const PROJECT: &str = "proj-1";
const HUB: &str = "hub-1";
const MEETING: &str = "meeting-abc";

fn setup_project_and_hub(conn: &Connection) {
    conn.execute(&projects::insert_or_ignore(PROJECT, "Project One"), [])
        .unwrap();
    conn.execute(&hubs::insert(HUB, "Hub One", PROJECT), [])
        .unwrap();
}

fn create_request(uuid: &str) -> CreateMeetingRequest {
    CreateMeetingRequest {
        uuid: uuid.to_string(),
        start_time: "2016-06-20 12:00:00".to_string(),
        location: "conference room".to_string(),
        meeting_type: "standup".to_string(),
        description: String::new(),
        is_complete: false,
        ending_method: None,
        end_time: None,
        log: None,
    }
}

fn chunk(index: i64, timestamp: f64) -> Value {
    json!({
        "event": "audio received",
        "log_index": index,
        "log_serial": index,
        "log_timestamp": timestamp,
        "data": {"samples": [3, 5, 2]},
    })
}

fn append_request(chunks: Vec<Value>) -> AppendRequest {
    AppendRequest {
        uuid: MEETING.to_string(),
        chunks,
        is_complete: false,
        ending_method: None,
        end_time: None,
    }
}

fn chunk_count(conn: &Connection, uuid: &str) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM chunks WHERE meeting_uuid = ?1",
        [uuid],
        |row| row.get(0),
    )
    .unwrap()
}

fn meeting_state(conn: &Connection, uuid: &str) -> (Option<i64>, Option<f64>, bool) {
    let row = sync::get_meeting(conn, uuid).unwrap().unwrap();
    (row.last_update_serial, row.last_update_time, row.is_complete)
}

#[test]
fn test_create_then_contiguous_batch_applies() {
    let mut conn = create_test_connection_in_memory();
    let data_dir = TempDir::new().unwrap();
    setup_project_and_hub(&conn);

    let outcome = sync::create_meeting(
        &mut conn,
        data_dir.path(),
        PROJECT,
        HUB,
        &create_request(MEETING),
    )
    .unwrap();
    assert!(outcome.created);
    assert_eq!(outcome.last_update_serial, None);

    let req = append_request(vec![chunk(0, 100.0), chunk(1, 101.0), chunk(2, 102.0)]);
    let outcome = sync::append_batch(&mut conn, data_dir.path(), PROJECT, HUB, &req).unwrap();

    match outcome {
        AppendOutcome::Applied {
            last_update_serial,
            last_update_time,
            closed,
        } => {
            assert_eq!(last_update_serial, Some(2));
            assert_eq!(last_update_time, Some(102.0));
            assert!(closed.is_none());
        }
        other => panic!("expected Applied, got {:?}", other),
    }

    assert_eq!(chunk_count(&conn, MEETING), 3);
    let final_chunk = chunk_store::final_chunk(&conn, MEETING).unwrap().unwrap();
    assert_eq!(final_chunk.log_index, 2);
}

#[test]
fn test_gap_batch_rejected_with_no_writes() {
    let mut conn = create_test_connection_in_memory();
    let data_dir = TempDir::new().unwrap();
    setup_project_and_hub(&conn);
    sync::create_meeting(
        &mut conn,
        data_dir.path(),
        PROJECT,
        HUB,
        &create_request(MEETING),
    )
    .unwrap();
    let req = append_request(vec![chunk(0, 100.0), chunk(1, 101.0), chunk(2, 102.0)]);
    sync::append_batch(&mut conn, data_dir.path(), PROJECT, HUB, &req).unwrap();

    // Serial 3 is missing; the batch starts at 4
    let gap = append_request(vec![chunk(4, 104.0), chunk(5, 105.0)]);
    let outcome = sync::append_batch(&mut conn, data_dir.path(), PROJECT, HUB, &gap).unwrap();
    assert!(matches!(outcome, AppendOutcome::LogMismatch));

    assert_eq!(chunk_count(&conn, MEETING), 3);
    assert_eq!(meeting_state(&conn, MEETING), (Some(2), Some(102.0), false));
}

#[test]
fn test_duplicate_batch_is_idempotent() {
    let mut conn = create_test_connection_in_memory();
    let data_dir = TempDir::new().unwrap();
    setup_project_and_hub(&conn);
    sync::create_meeting(
        &mut conn,
        data_dir.path(),
        PROJECT,
        HUB,
        &create_request(MEETING),
    )
    .unwrap();
    let req = append_request(vec![chunk(0, 100.0), chunk(1, 101.0), chunk(2, 102.0)]);
    sync::append_batch(&mut conn, data_dir.path(), PROJECT, HUB, &req).unwrap();

    // The hub never got the first acknowledgement and resends
    let outcome = sync::append_batch(&mut conn, data_dir.path(), PROJECT, HUB, &req).unwrap();
    match outcome {
        AppendOutcome::Applied {
            last_update_serial, ..
        } => assert_eq!(last_update_serial, Some(2)),
        other => panic!("expected Applied, got {:?}", other),
    }
    assert_eq!(chunk_count(&conn, MEETING), 3);
}

#[test]
fn test_malformed_chunk_rejects_whole_batch() {
    let mut conn = create_test_connection_in_memory();
    let data_dir = TempDir::new().unwrap();
    setup_project_and_hub(&conn);
    sync::create_meeting(
        &mut conn,
        data_dir.path(),
        PROJECT,
        HUB,
        &create_request(MEETING),
    )
    .unwrap();

    // Second chunk carries a scalar payload
    let bad = json!({
        "event": "audio received",
        "log_index": 1,
        "log_serial": 1,
        "log_timestamp": 101.0,
        "data": 42,
    });
    let req = append_request(vec![chunk(0, 100.0), bad]);
    let err = sync::append_batch(&mut conn, data_dir.path(), PROJECT, HUB, &req).unwrap_err();
    assert!(matches!(err, SyncError::Malformed(_)));
    assert_eq!(chunk_count(&conn, MEETING), 0);
    assert_eq!(meeting_state(&conn, MEETING), (None, None, false));
}

#[test]
fn test_close_derives_end_time_from_latest_sample() {
    let mut conn = create_test_connection_in_memory();
    let data_dir = TempDir::new().unwrap();
    setup_project_and_hub(&conn);
    sync::create_meeting(
        &mut conn,
        data_dir.path(),
        PROJECT,
        HUB,
        &create_request(MEETING),
    )
    .unwrap();

    let mut req = append_request(vec![chunk(0, 1466428800.0), chunk(1, 1466428860.5)]);
    req.is_complete = true;
    req.ending_method = Some("auto".to_string());

    let outcome = sync::append_batch(&mut conn, data_dir.path(), PROJECT, HUB, &req).unwrap();
    let summary = match outcome {
        AppendOutcome::Applied { closed, .. } => closed.expect("meeting should have closed"),
        other => panic!("expected Applied, got {:?}", other),
    };
    assert_eq!(summary.end_time_ms, 1466428860500);
    assert_eq!(summary.ending_method.as_deref(), Some("auto"));

    let (_, _, is_complete) = meeting_state(&conn, MEETING);
    assert!(is_complete);
}

#[test]
fn test_close_without_time_source_leaves_meeting_open() {
    let mut conn = create_test_connection_in_memory();
    let data_dir = TempDir::new().unwrap();
    setup_project_and_hub(&conn);
    sync::create_meeting(
        &mut conn,
        data_dir.path(),
        PROJECT,
        HUB,
        &create_request(MEETING),
    )
    .unwrap();

    // Re-attach requesting a close, but no end_time, no samples, no log
    let mut req = create_request(MEETING);
    req.is_complete = true;
    let err =
        sync::create_meeting(&mut conn, data_dir.path(), PROJECT, HUB, &req).unwrap_err();
    assert!(matches!(err, SyncError::Close(_)));

    let (_, _, is_complete) = meeting_state(&conn, MEETING);
    assert!(!is_complete);
}

#[test]
fn test_wrong_hub_is_unauthorized_and_writes_nothing() {
    let mut conn = create_test_connection_in_memory();
    let data_dir = TempDir::new().unwrap();
    setup_project_and_hub(&conn);
    conn.execute(&hubs::insert("hub-2", "Hub Two", PROJECT), [])
        .unwrap();
    sync::create_meeting(
        &mut conn,
        data_dir.path(),
        PROJECT,
        HUB,
        &create_request(MEETING),
    )
    .unwrap();

    let req = append_request(vec![chunk(0, 100.0)]);
    let err =
        sync::append_batch(&mut conn, data_dir.path(), PROJECT, "hub-2", &req).unwrap_err();
    assert!(matches!(err, SyncError::Unauthorized));
    assert_eq!(chunk_count(&conn, MEETING), 0);
}

#[test]
fn test_legacy_append_then_recover_round_trip() {
    let mut conn = create_test_connection_in_memory();
    let data_dir = TempDir::new().unwrap();
    setup_project_and_hub(&conn);
    sync::create_meeting(
        &mut conn,
        data_dir.path(),
        PROJECT,
        HUB,
        &create_request(MEETING),
    )
    .unwrap();

    let lines = vec![
        json!(r#"{"type": "audio received", "last_log_serial": 1, "last_log_time": 100.5}"#),
        json!(r#"{"type": "audio received", "last_log_serial": 2, "last_log_time": 101.5}"#),
    ];
    let req = append_request(lines);
    let outcome = sync::append_batch(&mut conn, data_dir.path(), PROJECT, HUB, &req).unwrap();
    match outcome {
        AppendOutcome::Applied {
            last_update_serial,
            last_update_time,
            ..
        } => {
            assert_eq!(last_update_serial, Some(2));
            assert_eq!(last_update_time, Some(101.5));
        }
        other => panic!("expected Applied, got {:?}", other),
    }

    // Recovery from the stream alone agrees with the tracked position
    let tail = legacy_log::recover_last_line(data_dir.path(), MEETING)
        .unwrap()
        .unwrap();
    assert_eq!(tail.last_log_serial, 2);
    assert_eq!(tail.last_log_time, 101.5);
}

#[test]
fn test_legacy_duplicate_batch_is_acknowledged_without_append() {
    let mut conn = create_test_connection_in_memory();
    let data_dir = TempDir::new().unwrap();
    setup_project_and_hub(&conn);
    sync::create_meeting(
        &mut conn,
        data_dir.path(),
        PROJECT,
        HUB,
        &create_request(MEETING),
    )
    .unwrap();

    let line = json!(r#"{"type": "audio received", "last_log_serial": 1, "last_log_time": 100.5}"#);
    let req = append_request(vec![line.clone()]);
    sync::append_batch(&mut conn, data_dir.path(), PROJECT, HUB, &req).unwrap();
    let len_after_first = std::fs::read(legacy_log::log_path(data_dir.path(), MEETING))
        .unwrap()
        .len();

    let outcome = sync::append_batch(&mut conn, data_dir.path(), PROJECT, HUB, &req).unwrap();
    match outcome {
        AppendOutcome::Applied {
            last_update_serial, ..
        } => assert_eq!(last_update_serial, Some(1)),
        other => panic!("expected Applied, got {:?}", other),
    }

    // The stream is append-only; the retransmission changed nothing
    let len_after_second = std::fs::read(legacy_log::log_path(data_dir.path(), MEETING))
        .unwrap()
        .len();
    assert_eq!(len_after_first, len_after_second);
}

#[test]
fn test_create_with_embedded_log_seeds_position() {
    let mut conn = create_test_connection_in_memory();
    let data_dir = TempDir::new().unwrap();
    setup_project_and_hub(&conn);

    let mut req = create_request(MEETING);
    req.log = Some(
        "{\"type\": \"audio received\", \"last_log_serial\": 5, \"last_log_time\": 99.5}\n"
            .to_string(),
    );
    let outcome =
        sync::create_meeting(&mut conn, data_dir.path(), PROJECT, HUB, &req).unwrap();
    assert_eq!(outcome.last_update_serial, Some(5));
    assert_eq!(outcome.last_update_time, Some(99.5));

    // The next contiguous batch continues at 6
    let line = json!(r#"{"type": "audio received", "last_log_serial": 6, "last_log_time": 100.5}"#);
    let append = append_request(vec![line]);
    let outcome =
        sync::append_batch(&mut conn, data_dir.path(), PROJECT, HUB, &append).unwrap();
    assert!(matches!(
        outcome,
        AppendOutcome::Applied {
            last_update_serial: Some(6),
            ..
        }
    ));
}

#[test]
fn test_legacy_unordered_batch_advances_to_batch_maximum() {
    let mut conn = create_test_connection_in_memory();
    let data_dir = TempDir::new().unwrap();
    setup_project_and_hub(&conn);
    sync::create_meeting(
        &mut conn,
        data_dir.path(),
        PROJECT,
        HUB,
        &create_request(MEETING),
    )
    .unwrap();

    let first = append_request(vec![json!(
        r#"{"type": "audio received", "last_log_serial": 1, "last_log_time": 100.5}"#
    )]);
    sync::append_batch(&mut conn, data_dir.path(), PROJECT, HUB, &first).unwrap();

    // The batch passes the gap check on its first line but is out of order;
    // the tracker must land on the batch maximum, not the final element
    let unordered = append_request(vec![
        json!(r#"{"type": "audio received", "last_log_serial": 2, "last_log_time": 101.5}"#),
        json!(r#"{"type": "audio received", "last_log_serial": 0, "last_log_time": 99.5}"#),
    ]);
    let outcome =
        sync::append_batch(&mut conn, data_dir.path(), PROJECT, HUB, &unordered).unwrap();
    match outcome {
        AppendOutcome::Applied {
            last_update_serial,
            last_update_time,
            ..
        } => {
            assert_eq!(last_update_serial, Some(2));
            assert_eq!(last_update_time, Some(101.5));
        }
        other => panic!("expected Applied, got {:?}", other),
    }
    assert_eq!(meeting_state(&conn, MEETING), (Some(2), Some(101.5), false));
}

#[test]
fn test_chunk_unordered_batch_tracks_maximum() {
    let mut conn = create_test_connection_in_memory();
    let data_dir = TempDir::new().unwrap();
    setup_project_and_hub(&conn);
    sync::create_meeting(
        &mut conn,
        data_dir.path(),
        PROJECT,
        HUB,
        &create_request(MEETING),
    )
    .unwrap();

    let req = append_request(vec![chunk(0, 100.0), chunk(2, 102.0), chunk(1, 101.0)]);
    let outcome = sync::append_batch(&mut conn, data_dir.path(), PROJECT, HUB, &req).unwrap();
    match outcome {
        AppendOutcome::Applied {
            last_update_serial,
            last_update_time,
            ..
        } => {
            assert_eq!(last_update_serial, Some(2));
            assert_eq!(last_update_time, Some(102.0));
        }
        other => panic!("expected Applied, got {:?}", other),
    }

    let final_chunk = chunk_store::final_chunk(&conn, MEETING).unwrap().unwrap();
    assert_eq!(final_chunk.log_index, 2);
}

#[test]
fn test_rejected_log_upload_leaves_stream_intact() {
    let mut conn = create_test_connection_in_memory();
    let data_dir = TempDir::new().unwrap();
    setup_project_and_hub(&conn);

    let mut req = create_request(MEETING);
    req.log = Some(
        "{\"type\": \"audio received\", \"last_log_serial\": 3, \"last_log_time\": 77.5}\n"
            .to_string(),
    );
    sync::create_meeting(&mut conn, data_dir.path(), PROJECT, HUB, &req).unwrap();
    let stored_before =
        std::fs::read(legacy_log::log_path(data_dir.path(), MEETING)).unwrap();

    // Re-attach with a log whose tail does not parse
    let mut bad = create_request(MEETING);
    bad.log = Some("this is not a log line\n".to_string());
    let err = sync::create_meeting(&mut conn, data_dir.path(), PROJECT, HUB, &bad).unwrap_err();
    assert!(matches!(err, SyncError::Malformed(_)));

    // The stored stream and the tracked position are untouched
    let stored_after =
        std::fs::read(legacy_log::log_path(data_dir.path(), MEETING)).unwrap();
    assert_eq!(stored_before, stored_after);
    assert_eq!(meeting_state(&conn, MEETING), (Some(3), Some(77.5), false));
}

#[test]
fn test_append_to_unknown_meeting_fails() {
    let mut conn = create_test_connection_in_memory();
    let data_dir = TempDir::new().unwrap();
    setup_project_and_hub(&conn);

    let req = append_request(vec![chunk(0, 100.0)]);
    let err = sync::append_batch(&mut conn, data_dir.path(), PROJECT, HUB, &req).unwrap_err();
    assert!(matches!(err, SyncError::UnknownMeeting { .. }));
}
