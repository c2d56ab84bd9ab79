//! Scripted in-memory gateway for driving the orchestration loops
//! without a server.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use perfcloud_runner::config::{AuthMethod, PollingConfig, ServerConfig};
use perfcloud_runner::error::ApiError;
use perfcloud_runner::gateway::{ApiGateway, LoadTestInfo, ReportFormat, ReportStatus};
use perfcloud_runner::model::{
    RunIdentity, RunOptions, RunStatistics, RunStatus, StatusSnapshot, TransactionStats,
};

pub fn snapshot(status: RunStatus, has_report: bool) -> StatusSnapshot {
    StatusSnapshot {
        status,
        has_report,
        start_time: None,
        end_time: None,
    }
}

pub fn identity() -> RunIdentity {
    RunIdentity {
        test_id: 42,
        project_id: 7,
        tenant_id: "tenant-1".to_string(),
    }
}

/// Millisecond-scale timing so loop tests finish quickly.
pub fn fast_polling() -> PollingConfig {
    PollingConfig {
        poll_interval: std::time::Duration::from_millis(5),
        stop_wait_ceiling: std::time::Duration::from_millis(100),
        report_poll_interval: std::time::Duration::from_millis(5),
        ..PollingConfig::default()
    }
}

pub fn server_config(workspace: &Path) -> ServerConfig {
    ServerConfig {
        url: Url::parse("https://perfcloud.example.com/").unwrap(),
        tenant_id: "tenant-1".to_string(),
        project_id: 7,
        auth: AuthMethod::Basic {
            username: "user".to_string(),
            password: "secret".to_string(),
        },
        proxy: None,
        workspace: workspace.to_path_buf(),
    }
}

pub fn stats(run_id: u32, transactions: Vec<TransactionStats>) -> RunStatistics {
    RunStatistics {
        run_id,
        vusers: 10,
        duration_sec: 600,
        percentile: 90,
        avg_throughput: 1024.0,
        total_throughput: 2048.0,
        avg_hits: 12.5,
        total_hits: 7500.0,
        tx_passed: 100,
        tx_failed: 2,
        errors_per_sec: 0.01,
        transactions,
    }
}

pub fn tx(script: &str, name: &str, avg: f64, percentile: f64) -> TransactionStats {
    TransactionStats {
        name: name.to_string(),
        script: script.to_string(),
        min: avg / 2.0,
        max: avg * 2.0,
        avg,
        percentile_value: percentile,
        breach_count: 0.0,
        sla_threshold: 5.0,
    }
}

/// [`ApiGateway`] whose responses are scripted per call. Queues are
/// consumed front to back; an exhausted status queue falls back to
/// `final_status`.
#[derive(Default)]
pub struct ScriptedGateway {
    pub login_calls: AtomicU32,
    pub login_results: Mutex<VecDeque<Result<(), ApiError>>>,
    pub start_result: Mutex<Option<Result<u32, ApiError>>>,
    pub status_script: Mutex<VecDeque<Result<StatusSnapshot, ApiError>>>,
    pub final_status: Mutex<Option<StatusSnapshot>>,
    pub stop_calls: AtomicU32,
    pub stop_result: Mutex<Option<Result<(), ApiError>>>,
    /// When set, a stop request rewrites `final_status` — models the
    /// remote honoring the stop.
    pub stop_flips_to: Mutex<Option<StatusSnapshot>>,
    pub statistics: Mutex<HashMap<u32, RunStatistics>>,
    pub transactions: Mutex<Option<Result<Vec<TransactionStats>, ApiError>>>,
    pub report_requests: Mutex<VecDeque<Result<u32, ApiError>>>,
    pub report_statuses: Mutex<HashMap<u32, VecDeque<ReportStatus>>>,
    pub report_content: Mutex<HashMap<u32, Bytes>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_status(&self, result: Result<StatusSnapshot, ApiError>) {
        self.status_script.lock().unwrap().push_back(result);
    }

    pub fn set_final_status(&self, status: StatusSnapshot) {
        *self.final_status.lock().unwrap() = Some(status);
    }
}

#[async_trait]
impl ApiGateway for ScriptedGateway {
    async fn login(&self) -> Result<(), ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.login_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn get_load_test(&self, identity: &RunIdentity) -> Result<LoadTestInfo, ApiError> {
        Ok(LoadTestInfo {
            id: identity.test_id,
            name: "Checkout flow".to_string(),
        })
    }

    async fn start_run(
        &self,
        _identity: &RunIdentity,
        _options: &RunOptions,
    ) -> Result<u32, ApiError> {
        self.start_result
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Ok(1000))
    }

    async fn get_run_status(&self, _run_id: u32) -> Result<StatusSnapshot, ApiError> {
        if let Some(scripted) = self.status_script.lock().unwrap().pop_front() {
            return scripted;
        }
        match &*self.final_status.lock().unwrap() {
            Some(status) => Ok(status.clone()),
            None => Err(ApiError::Fatal("status script exhausted".to_string())),
        }
    }

    async fn stop_run(&self, _run_id: u32) -> Result<(), ApiError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(flipped) = self.stop_flips_to.lock().unwrap().take() {
            *self.final_status.lock().unwrap() = Some(flipped);
        }
        self.stop_result.lock().unwrap().take().unwrap_or(Ok(()))
    }

    async fn get_run_statistics(&self, run_id: u32) -> Result<RunStatistics, ApiError> {
        self.statistics
            .lock()
            .unwrap()
            .get(&run_id)
            .cloned()
            .ok_or_else(|| ApiError::Fatal(format!("no statistics for run {run_id}")))
    }

    async fn get_transaction_stats(
        &self,
        _run_id: u32,
    ) -> Result<Vec<TransactionStats>, ApiError> {
        self.transactions
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Ok(Vec::new()))
    }

    async fn request_report(
        &self,
        _run_id: u32,
        _format: ReportFormat,
    ) -> Result<u32, ApiError> {
        self.report_requests
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ApiError::Fatal("no report scripted".to_string())))
    }

    async fn get_report_status(&self, report_id: u32) -> Result<ReportStatus, ApiError> {
        let mut statuses = self.report_statuses.lock().unwrap();
        match statuses.get_mut(&report_id).and_then(VecDeque::pop_front) {
            Some(status) => Ok(status),
            None => Ok(ReportStatus::Ready),
        }
    }

    async fn download_report(&self, report_id: u32) -> Result<Bytes, ApiError> {
        self.report_content
            .lock()
            .unwrap()
            .get(&report_id)
            .cloned()
            .ok_or_else(|| ApiError::Fatal(format!("no content for report {report_id}")))
    }
}
