//! CLI integration tests

use mockito::Matcher;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run(db: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_activity-syncctl"))
        .arg("--db")
        .arg(db)
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute command")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_activity-syncctl"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("checkpoints"), "Should show checkpoints command");
    assert!(stdout.contains("buckets"), "Should show buckets command");
    assert!(stdout.contains("health"), "Should show health command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_activity-syncctl"))
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("activity-syncctl"), "Should show binary name");
}

#[test]
fn test_set_then_list_checkpoints() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("sync.db");

    let set = run(
        &db,
        &[
            "--format",
            "json",
            "checkpoints",
            "set",
            "aw-watcher-window",
            "2024-03-01T10:00:00+02:00",
            "--id",
            "42",
        ],
    );
    let checkpoint = stdout_json(&set);
    assert_eq!(checkpoint["last_id"], "42");

    let list = stdout_json(&run(&db, &["--format", "json", "checkpoints", "list"]));
    let records = list.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["bucket"], "aw-watcher-window");
    assert_eq!(
        records[0]["checkpoint"]["last_timestamp"],
        "2024-03-01T08:00:00Z"
    );
}

#[test]
fn test_reset_single_and_all() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("sync.db");
    for bucket in ["a", "b", "c"] {
        let output = run(&db, &["checkpoints", "set", bucket, "2024-01-01T00:00:00Z"]);
        assert!(output.status.success());
    }

    let single = stdout_json(&run(&db, &["--format", "json", "checkpoints", "reset", "a"]));
    assert_eq!(single["removed"], 1);

    let missing = stdout_json(&run(&db, &["--format", "json", "checkpoints", "reset", "a"]));
    assert_eq!(missing["removed"], 0);

    let all = stdout_json(&run(&db, &["--format", "json", "checkpoints", "reset", "--all"]));
    assert_eq!(all["removed"], 2);

    let list = stdout_json(&run(&db, &["--format", "json", "checkpoints", "list"]));
    assert!(list.as_array().unwrap().is_empty());
}

#[test]
fn test_invalid_arguments_fail() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("sync.db");

    let bad_timestamp = run(&db, &["checkpoints", "set", "a", "yesterday"]);
    assert!(!bad_timestamp.status.success());
    assert!(String::from_utf8_lossy(&bad_timestamp.stderr).contains("RFC 3339"));

    let no_target = run(&db, &["checkpoints", "reset"]);
    assert!(!no_target.status.success());

    let both = run(&db, &["checkpoints", "reset", "a", "--all"]);
    assert!(!both.status.success());
}

#[test]
fn test_buckets_counts_pending_after_checkpoint() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("sync.db");
    let mut server = mockito::Server::new();

    server
        .mock("GET", "/api/0/buckets")
        .with_header("content-type", "application/json")
        .with_body(r#"{"W": {}, "A": {}}"#)
        .create();
    server
        .mock("GET", "/api/0/buckets/W/events")
        .match_query(Matcher::UrlEncoded(
            "start".into(),
            "2024-01-01T00:00:10Z".into(),
        ))
        .with_header("content-type", "application/json")
        .with_body(
            r#"[
                {"id": 10, "timestamp": "2024-01-01T00:00:10Z", "data": {}},
                {"id": 11, "timestamp": "2024-01-01T00:00:11Z", "data": {}},
                {"id": 12, "timestamp": "2024-01-01T00:00:12Z", "data": {}}
            ]"#,
        )
        .create();
    server
        .mock("GET", "/api/0/buckets/A/events")
        .match_query(Matcher::Any)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create();

    let set = run(
        &db,
        &["checkpoints", "set", "W", "2024-01-01T00:00:10Z", "--id", "10"],
    );
    assert!(set.status.success());

    let local_api = format!("{}/api/0", server.url());
    let statuses = stdout_json(&run(
        &db,
        &["--format", "json", "buckets", "--local-api", &local_api],
    ));
    let statuses = statuses.as_array().unwrap();

    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0]["bucket"], "A");
    assert_eq!(statuses[0]["pending"], 0);
    assert!(statuses[0]["checkpoint"].is_null());
    assert_eq!(statuses[1]["bucket"], "W");
    assert_eq!(statuses[1]["pending"], 2);
}

#[test]
fn test_health_reports_agent_state() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("sync.db");
    let mut server = mockito::Server::new();

    server
        .mock("GET", "/healthz")
        .with_status(503)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"status": "unhealthy", "components": {"local_source": {
                "status": "unhealthy", "message": "connection refused",
                "last_check": "2024-01-01T00:00:00Z"}}}"#,
        )
        .create();
    server
        .mock("GET", "/readyz")
        .with_header("content-type", "application/json")
        .with_body(r#"{"ready": true}"#)
        .create();

    let report = stdout_json(&run(
        &db,
        &["--format", "json", "health", "--agent-url", &server.url()],
    ));
    assert_eq!(report["health"]["status"], "unhealthy");
    assert_eq!(
        report["health"]["components"]["local_source"]["message"],
        "connection refused"
    );
    assert_eq!(report["readiness"]["ready"], true);
}
