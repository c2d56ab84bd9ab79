use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identifies one load test in one project of one tenant.
/// Immutable once a run has been requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    pub test_id: u32,
    pub project_id: u32,
    pub tenant_id: String,
}

/// Caller-supplied options for a single test run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    pub send_email: bool,
    pub skip_pdf_report: bool,
    pub debug_logging: bool,
}

/// Remote run status. `Unknown` covers statuses this client cannot map
/// (including transitional ones like a stop still being processed) and is
/// never a successful final outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Initializing,
    Running,
    Passed,
    Failed,
    Stopped,
    Aborted,
    Unknown,
}

impl RunStatus {
    /// Parse the remote's status string. Unrecognized values map to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "INITIALIZING" => RunStatus::Initializing,
            "RUNNING" => RunStatus::Running,
            "PASSED" => RunStatus::Passed,
            "FAILED" => RunStatus::Failed,
            // The service reports an internal crash as its own status; for
            // run disposition it is a failed run.
            "SYSTEM_ERROR" => RunStatus::Failed,
            "STOPPED" => RunStatus::Stopped,
            "ABORTED" | "HALTED" => RunStatus::Aborted,
            _ => RunStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Initializing => "INITIALIZING",
            RunStatus::Running => "RUNNING",
            RunStatus::Passed => "PASSED",
            RunStatus::Failed => "FAILED",
            RunStatus::Stopped => "STOPPED",
            RunStatus::Aborted => "ABORTED",
            RunStatus::Unknown => "UNKNOWN",
        }
    }

    /// A terminal status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Passed | RunStatus::Failed | RunStatus::Stopped | RunStatus::Aborted
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Passed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point-in-time view of a run's remote state, as returned by the
/// status endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub status: RunStatus,
    pub has_report: bool,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

/// One test run, from start-request to collected artifacts.
///
/// Mutated only by the poller (status fields) and the artifact collector
/// (`report_artifacts`); treated as immutable once handed back to the
/// caller. Serializes without the artifact bytes — the handoff file
/// carries run metadata only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRun {
    pub id: u32,
    pub load_test_id: u32,
    pub load_test_name: String,
    pub status: RunStatus,
    pub has_report: bool,
    /// Epoch milliseconds reported by the service, when known.
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    #[serde(skip)]
    pub report_artifacts: BTreeMap<String, Bytes>,
}

impl TestRun {
    pub fn new(id: u32, load_test_id: u32, load_test_name: impl Into<String>) -> Self {
        Self {
            id,
            load_test_id,
            load_test_name: load_test_name.into(),
            status: RunStatus::Initializing,
            has_report: false,
            start_time: None,
            end_time: None,
            report_artifacts: BTreeMap::new(),
        }
    }

    /// Fold a fresh status snapshot into the run. Timestamps only ever
    /// move from unset to set; `has_report` may flip to true on a later
    /// poll than the one that observed the terminal status.
    pub fn apply_status(&mut self, snapshot: &StatusSnapshot) {
        self.status = snapshot.status;
        self.has_report = snapshot.has_report;
        if snapshot.start_time.is_some() {
            self.start_time = snapshot.start_time;
        }
        if snapshot.end_time.is_some() {
            self.end_time = snapshot.end_time;
        }
    }

    /// Wall-clock duration in seconds, when the service reported both ends.
    pub fn duration_secs(&self) -> Option<f64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if end > start => Some((end - start) as f64 / 1000.0),
            _ => None,
        }
    }
}

/// Response-time statistics for one transaction of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionStats {
    pub name: String,
    pub script: String,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub percentile_value: f64,
    /// SLA breach count reported by the service.
    pub breach_count: f64,
    pub sla_threshold: f64,
}

/// Run-level statistics for a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub run_id: u32,
    pub vusers: u32,
    pub duration_sec: u32,
    pub percentile: u32,
    pub avg_throughput: f64,
    pub total_throughput: f64,
    pub avg_hits: f64,
    pub total_hits: f64,
    pub tx_passed: u32,
    pub tx_failed: u32,
    pub errors_per_sec: f64,
    pub transactions: Vec<TransactionStats>,
}

/// Strip the unit suffix the service attaches to throughput figures
/// (e.g. `"1.5 MB/s"`), normalizing byte-based units to bytes.
/// Returns -1.0 for values that don't follow the `<number> <unit>` shape.
pub fn strip_throughput_unit(with_unit: &str) -> f64 {
    let mut parts = with_unit.split(' ');
    let (Some(num), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
        return -1.0;
    };
    let Ok(num) = num.parse::<f64>() else {
        return -1.0;
    };
    let unit = unit.strip_suffix("/s").unwrap_or(unit);
    const BYTE_UNITS: &[&str] = &["bytes", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];
    match BYTE_UNITS.iter().position(|u| *u == unit) {
        Some(i) => num * 1024f64.powi(i as i32),
        None => num,
    }
}

/// Parse the service's `HH:MM:SS` duration format into seconds.
pub fn parse_duration_secs(duration: &str) -> Option<u32> {
    let mut parts = duration.split(':');
    let hours: u32 = parts.next()?.parse().ok()?;
    let minutes: u32 = parts.next()?.parse().ok()?;
    let seconds: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600 + minutes * 60 + seconds)
}

/// Thresholds for one response-time metric (average or percentile),
/// in percent. Validation happens here, at construction time, never
/// per-evaluation: out-of-range inputs fall back to the defaults, and an
/// inverted or equal major/minor ordering is corrected to `minor + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricThresholds {
    pub improvement: u32,
    pub minor_regression: u32,
    pub major_regression: u32,
}

pub const DEFAULT_IMPROVEMENT_PCT: u32 = 5;
pub const DEFAULT_MINOR_REGRESSION_PCT: u32 = 5;
pub const DEFAULT_MAJOR_REGRESSION_PCT: u32 = 10;

impl MetricThresholds {
    pub fn new(improvement: u32, minor_regression: u32, major_regression: u32) -> Self {
        fn sanitize(value: u32, default: u32) -> u32 {
            if value == 0 || value > 100 {
                default
            } else {
                value
            }
        }
        let improvement = sanitize(improvement, DEFAULT_IMPROVEMENT_PCT);
        let minor_regression = sanitize(minor_regression, DEFAULT_MINOR_REGRESSION_PCT);
        let mut major_regression = sanitize(major_regression, DEFAULT_MAJOR_REGRESSION_PCT);
        if major_regression <= minor_regression {
            major_regression = minor_regression + 1;
        }
        Self {
            improvement,
            minor_regression,
            major_regression,
        }
    }
}

impl Default for MetricThresholds {
    fn default() -> Self {
        Self::new(
            DEFAULT_IMPROVEMENT_PCT,
            DEFAULT_MINOR_REGRESSION_PCT,
            DEFAULT_MAJOR_REGRESSION_PCT,
        )
    }
}

pub const MIN_TRENDING_RUNS: u32 = 5;
pub const MAX_TRENDING_RUNS: u32 = 10;

/// Trending configuration. `benchmark_run_id` of 0 means "no designated
/// benchmark, use the previous run" and is normalized to `None` (a run id
/// can never be 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendingThresholds {
    pub runs_count: u32,
    pub benchmark_run_id: Option<u32>,
    pub avg: MetricThresholds,
    pub percentile: MetricThresholds,
}

impl TrendingThresholds {
    pub fn new(
        runs_count: u32,
        benchmark_run_id: u32,
        avg: MetricThresholds,
        percentile: MetricThresholds,
    ) -> Self {
        Self {
            runs_count: runs_count.clamp(MIN_TRENDING_RUNS, MAX_TRENDING_RUNS),
            benchmark_run_id: (benchmark_run_id != 0).then_some(benchmark_run_id),
            avg,
            percentile,
        }
    }
}

impl Default for TrendingThresholds {
    fn default() -> Self {
        Self::new(
            MIN_TRENDING_RUNS,
            0,
            MetricThresholds::default(),
            MetricThresholds::default(),
        )
    }
}
