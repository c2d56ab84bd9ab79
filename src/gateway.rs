use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ApiError;
use crate::model::{RunIdentity, RunOptions, RunStatistics, StatusSnapshot, TransactionStats};

/// Report formats the service generates remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Csv,
    Pdf,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Csv => "csv",
            ReportFormat::Pdf => "pdf",
        }
    }

    /// Wire value for the report-generation request.
    pub fn as_str(&self) -> &'static str {
        self.extension()
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Generation state of a requested report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportStatus {
    Ready,
    Pending,
    Failed(String),
}

/// Name and id of a load test definition, fetched before starting a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTestInfo {
    pub id: u32,
    pub name: String,
}

/// The remote performance-test service boundary.
///
/// Every method fails with an [`ApiError`] whose variant tells the caller
/// whether to retry (`Transient`), re-login (`AuthExpired`), or give up
/// (`Fatal`). Implementations own the session token; `login` refreshes it
/// in place.
#[async_trait]
pub trait ApiGateway: Send + Sync {
    async fn login(&self) -> Result<(), ApiError>;

    async fn get_load_test(&self, identity: &RunIdentity) -> Result<LoadTestInfo, ApiError>;

    /// Request a new run of the identified test; returns the run id.
    async fn start_run(
        &self,
        identity: &RunIdentity,
        options: &RunOptions,
    ) -> Result<u32, ApiError>;

    async fn get_run_status(&self, run_id: u32) -> Result<StatusSnapshot, ApiError>;

    async fn stop_run(&self, run_id: u32) -> Result<(), ApiError>;

    /// Run-level statistics. Transactions are fetched separately via
    /// [`ApiGateway::get_transaction_stats`]; implementations leave
    /// `transactions` empty here.
    async fn get_run_statistics(&self, run_id: u32) -> Result<RunStatistics, ApiError>;

    async fn get_transaction_stats(&self, run_id: u32)
        -> Result<Vec<TransactionStats>, ApiError>;

    /// Ask the service to generate a report; returns an opaque handle.
    async fn request_report(&self, run_id: u32, format: ReportFormat) -> Result<u32, ApiError>;

    async fn get_report_status(&self, report_id: u32) -> Result<ReportStatus, ApiError>;

    async fn download_report(&self, report_id: u32) -> Result<Bytes, ApiError>;
}
