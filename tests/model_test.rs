use perfcloud_runner::model::*;

// --- status mapping ---

#[test]
fn test_status_parsing() {
    assert_eq!(RunStatus::parse("INITIALIZING"), RunStatus::Initializing);
    assert_eq!(RunStatus::parse("RUNNING"), RunStatus::Running);
    assert_eq!(RunStatus::parse("PASSED"), RunStatus::Passed);
    assert_eq!(RunStatus::parse("FAILED"), RunStatus::Failed);
    assert_eq!(RunStatus::parse("STOPPED"), RunStatus::Stopped);
    assert_eq!(RunStatus::parse("ABORTED"), RunStatus::Aborted);
    // service-internal crash counts as a failed run
    assert_eq!(RunStatus::parse("SYSTEM_ERROR"), RunStatus::Failed);
}

#[test]
fn test_unrecognized_status_is_unknown() {
    assert_eq!(RunStatus::parse("STOPPING"), RunStatus::Unknown);
    assert_eq!(RunStatus::parse("NA"), RunStatus::Unknown);
    assert_eq!(RunStatus::parse(""), RunStatus::Unknown);
    assert_eq!(RunStatus::parse("passed"), RunStatus::Unknown);
}

#[test]
fn test_terminal_statuses() {
    assert!(RunStatus::Passed.is_terminal());
    assert!(RunStatus::Failed.is_terminal());
    assert!(RunStatus::Stopped.is_terminal());
    assert!(RunStatus::Aborted.is_terminal());

    assert!(!RunStatus::Initializing.is_terminal());
    assert!(!RunStatus::Running.is_terminal());
    assert!(!RunStatus::Unknown.is_terminal());
}

#[test]
fn test_only_passed_is_success() {
    assert!(RunStatus::Passed.is_success());
    assert!(!RunStatus::Stopped.is_success());
    assert!(!RunStatus::Unknown.is_success());
}

#[test]
fn test_status_round_trips_through_as_str() {
    for status in [
        RunStatus::Initializing,
        RunStatus::Running,
        RunStatus::Passed,
        RunStatus::Failed,
        RunStatus::Stopped,
        RunStatus::Aborted,
        RunStatus::Unknown,
    ] {
        assert_eq!(RunStatus::parse(status.as_str()), status);
    }
}

// --- run updates ---

#[test]
fn test_apply_status_keeps_known_timestamps() {
    let mut run = TestRun::new(1000, 42, "Checkout flow");
    run.apply_status(&StatusSnapshot {
        status: RunStatus::Running,
        has_report: false,
        start_time: Some(1_000),
        end_time: None,
    });
    assert_eq!(run.start_time, Some(1_000));

    // a later snapshot without timestamps does not erase them
    run.apply_status(&StatusSnapshot {
        status: RunStatus::Passed,
        has_report: true,
        start_time: None,
        end_time: None,
    });
    assert_eq!(run.status, RunStatus::Passed);
    assert!(run.has_report);
    assert_eq!(run.start_time, Some(1_000));
}

#[test]
fn test_duration_needs_both_timestamps() {
    let mut run = TestRun::new(1000, 42, "Checkout flow");
    assert_eq!(run.duration_secs(), None);
    run.start_time = Some(10_000);
    assert_eq!(run.duration_secs(), None);
    run.end_time = Some(70_000);
    assert_eq!(run.duration_secs(), Some(60.0));
}

// --- unit parsing ---

#[test]
fn test_strip_throughput_unit() {
    assert_eq!(strip_throughput_unit("2 MB/s"), 2.0 * 1024.0 * 1024.0);
    assert_eq!(strip_throughput_unit("1.5 KB/s"), 1.5 * 1024.0);
    assert_eq!(strip_throughput_unit("512 bytes/s"), 512.0);
    // unknown units pass the number through
    assert_eq!(strip_throughput_unit("12.5 hits/s"), 12.5);
}

#[test]
fn test_strip_throughput_unit_malformed() {
    assert_eq!(strip_throughput_unit(""), -1.0);
    assert_eq!(strip_throughput_unit("12"), -1.0);
    assert_eq!(strip_throughput_unit("a b c"), -1.0);
    assert_eq!(strip_throughput_unit("fast MB/s"), -1.0);
}

#[test]
fn test_parse_duration_secs() {
    assert_eq!(parse_duration_secs("01:02:03"), Some(3723));
    assert_eq!(parse_duration_secs("00:00:00"), Some(0));
    assert_eq!(parse_duration_secs("10:00:30"), Some(36030));
}

#[test]
fn test_parse_duration_malformed() {
    assert_eq!(parse_duration_secs(""), None);
    assert_eq!(parse_duration_secs("01:02"), None);
    assert_eq!(parse_duration_secs("01:02:03:04"), None);
    assert_eq!(parse_duration_secs("aa:bb:cc"), None);
}
