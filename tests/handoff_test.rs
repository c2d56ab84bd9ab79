use bytes::Bytes;

use perfcloud_runner::handoff::{handoff_path, load, save, BuildResult};
use perfcloud_runner::model::{RunOptions, RunStatus, TestRun};

fn completed_run() -> TestRun {
    let mut run = TestRun::new(1000, 42, "Checkout flow");
    run.status = RunStatus::Passed;
    run.has_report = true;
    run.start_time = Some(1_700_000_000_000);
    run.end_time = Some(1_700_000_600_000);
    run
}

#[test]
fn test_handoff_path_is_keyed_by_test_id() {
    let path = handoff_path(std::path::Path::new("/ws"), 42);
    assert_eq!(path, std::path::PathBuf::from("/ws/perfcloud_run_result_42"));
}

#[test]
fn test_round_trip() {
    let workspace = tempfile::tempdir().unwrap();
    let options = RunOptions {
        send_email: true,
        skip_pdf_report: false,
        debug_logging: true,
    };
    let run = completed_run();

    save(workspace.path(), 42, &options, &run).unwrap();
    let loaded = load(workspace.path(), 42).unwrap();

    assert_eq!(loaded.test_options, options);
    assert_eq!(loaded.test_run, run);
    assert_eq!(loaded.test_run.status, RunStatus::Passed);
}

#[test]
fn test_artifact_bytes_are_not_persisted() {
    let workspace = tempfile::tempdir().unwrap();
    let mut run = completed_run();
    run.report_artifacts.insert(
        "perfcloud_report_t-1000.pdf".to_string(),
        Bytes::from_static(b"big pdf"),
    );

    save(workspace.path(), 42, &RunOptions::default(), &run).unwrap();

    let raw = std::fs::read_to_string(handoff_path(workspace.path(), 42)).unwrap();
    assert!(!raw.contains("big pdf"));
    assert!(!raw.contains("report_artifacts"));

    let loaded = load(workspace.path(), 42).unwrap();
    assert!(loaded.test_run.report_artifacts.is_empty());
}

#[test]
fn test_wire_layout_uses_camel_case_keys() {
    let result = BuildResult {
        test_options: RunOptions::default(),
        test_run: completed_run(),
        written_at: chrono::Utc::now(),
    };
    let json = serde_json::to_value(&result).unwrap();
    assert!(json.get("testOptions").is_some());
    assert!(json.get("testRun").is_some());
    assert_eq!(json["testRun"]["status"], "PASSED");
}

#[test]
fn test_load_missing_file_is_an_error() {
    let workspace = tempfile::tempdir().unwrap();
    assert!(load(workspace.path(), 42).is_err());
}
