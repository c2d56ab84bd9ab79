mod common;

use std::sync::atomic::Ordering;

use bytes::Bytes;
use tokio::sync::watch;

use common::{fast_polling, identity, server_config, snapshot, stats, tx, ScriptedGateway};
use perfcloud_runner::error::RunnerError;
use perfcloud_runner::model::{RunOptions, RunStatus, TrendingThresholds};
use perfcloud_runner::runner::Runner;

#[tokio::test]
async fn test_run_to_completion_collects_artifacts() {
    let gateway = ScriptedGateway::new();
    gateway.push_status(Ok(snapshot(RunStatus::Initializing, false)));
    gateway.push_status(Ok(snapshot(RunStatus::Running, false)));
    // terminal, with the report flag lagging one poll behind
    gateway.push_status(Ok(snapshot(RunStatus::Passed, false)));
    gateway.set_final_status(snapshot(RunStatus::Passed, true));
    gateway.report_requests.lock().unwrap().push_back(Ok(11));
    gateway.report_requests.lock().unwrap().push_back(Ok(12));
    gateway
        .report_content
        .lock()
        .unwrap()
        .insert(11, Bytes::from_static(b"csv-bytes"));
    gateway
        .report_content
        .lock()
        .unwrap()
        .insert(12, Bytes::from_static(b"pdf-bytes"));
    *gateway.transactions.lock().unwrap() = Some(Ok(vec![tx("s1", "login", 100.0, 200.0)]));

    let polling = fast_polling();
    let workspace = tempfile::tempdir().unwrap();
    let server = server_config(workspace.path());
    let runner = Runner::new(&gateway, &polling, &server, RunOptions::default());
    let (_cancel_tx, cancel_rx) = watch::channel(false);

    let run = runner.run(&identity(), cancel_rx).await.unwrap();

    assert_eq!(run.status, RunStatus::Passed);
    assert!(run.status.is_success());
    // the post-terminal refresh picked up the lagging report flag
    assert!(run.has_report);
    assert_eq!(run.report_artifacts.len(), 4);
}

#[tokio::test]
async fn test_cancellation_transfers_to_interruption_handler() {
    let gateway = ScriptedGateway::new();
    gateway.set_final_status(snapshot(RunStatus::Running, false));
    *gateway.stop_flips_to.lock().unwrap() = Some(snapshot(RunStatus::Stopped, false));

    let polling = fast_polling();
    let workspace = tempfile::tempdir().unwrap();
    let server = server_config(workspace.path());
    let runner = Runner::new(&gateway, &polling, &server, RunOptions::default());

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let _ = cancel_tx.send(true);
    });

    let err = runner.run(&identity(), cancel_rx).await.unwrap_err();
    match err {
        RunnerError::Interrupted { outcome } => assert_eq!(outcome, RunStatus::Stopped),
        other => panic!("expected Interrupted, got {other:?}"),
    }
    assert_eq!(gateway.stop_calls.load(Ordering::SeqCst), 1);
    // outcome left behind for the recovery pass
    assert_eq!(
        runner.interruption_flags().peek(identity().test_id),
        Some(RunStatus::Stopped)
    );
}

#[tokio::test]
async fn test_leftover_interruption_flag_is_consumed_on_next_run() {
    let gateway = ScriptedGateway::new();
    gateway.set_final_status(snapshot(RunStatus::Passed, false));

    let polling = fast_polling();
    let workspace = tempfile::tempdir().unwrap();
    let server = server_config(workspace.path());
    let runner = Runner::new(&gateway, &polling, &server, RunOptions::default());

    runner
        .interruption_flags()
        .record(identity().test_id, RunStatus::Unknown)
        .unwrap();

    let (_cancel_tx, cancel_rx) = watch::channel(false);
    runner.run(&identity(), cancel_rx).await.unwrap();

    assert_eq!(runner.interruption_flags().peek(identity().test_id), None);
}

#[tokio::test]
async fn test_fetch_trending_with_benchmark() {
    let gateway = ScriptedGateway::new();
    gateway
        .statistics
        .lock()
        .unwrap()
        .insert(1000, stats(1000, vec![]));
    gateway
        .statistics
        .lock()
        .unwrap()
        .insert(900, stats(900, vec![]));
    *gateway.transactions.lock().unwrap() = Some(Ok(vec![tx("s1", "login", 110.0, 200.0)]));

    let polling = fast_polling();
    let workspace = tempfile::tempdir().unwrap();
    let server = server_config(workspace.path());
    let runner = Runner::new(&gateway, &polling, &server, RunOptions::default());

    let mut run = perfcloud_runner::model::TestRun::new(1000, 42, "Checkout flow");
    run.status = RunStatus::Passed;
    let thresholds = TrendingThresholds::new(
        5,
        900,
        Default::default(),
        Default::default(),
    );

    let result = runner.fetch_trending(&run, &thresholds).await.unwrap();
    assert_eq!(result.current.run_id, 1000);
    assert_eq!(result.benchmark_run_id, Some(900));
    assert!(result.aggregate.is_some());
}

#[tokio::test]
async fn test_fetch_trending_benchmark_failure_degrades_to_baseline() {
    let gateway = ScriptedGateway::new();
    gateway
        .statistics
        .lock()
        .unwrap()
        .insert(1000, stats(1000, vec![]));
    // run 900 missing from the gateway

    let polling = fast_polling();
    let workspace = tempfile::tempdir().unwrap();
    let server = server_config(workspace.path());
    let runner = Runner::new(&gateway, &polling, &server, RunOptions::default());

    let mut run = perfcloud_runner::model::TestRun::new(1000, 42, "Checkout flow");
    run.status = RunStatus::Passed;
    let thresholds =
        TrendingThresholds::new(5, 900, Default::default(), Default::default());

    let result = runner.fetch_trending(&run, &thresholds).await.unwrap();
    assert!(result.benchmark.is_none());
    assert!(result.aggregate.is_none());
}
