use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use url::Url;

use crate::model::{MetricThresholds, RunIdentity, RunOptions, TrendingThresholds};

/// Perfcloud Runner — executes load test runs on a remote
/// performance-test cloud from a CI pipeline step.
#[derive(Parser, Debug)]
#[command(name = "perfcloud-runner", version)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a test run, wait for it to end, download report artifacts.
    Run(RunArgs),
    /// Evaluate run-over-run trending for a previously completed run.
    Trending(TrendingArgs),
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Server URL of the performance-test cloud
    #[arg(long = "server-url")]
    pub server_url: String,

    /// Tenant id
    #[arg(long = "tenant-id")]
    pub tenant_id: String,

    /// Project id
    #[arg(long = "project-id")]
    pub project_id: u32,

    /// Username (basic auth)
    #[arg(long = "username")]
    pub username: Option<String>,

    /// Password (basic auth)
    #[arg(long = "password")]
    pub password: Option<String>,

    /// OAuth client id
    #[arg(long = "client-id")]
    pub client_id: Option<String>,

    /// OAuth client secret
    #[arg(long = "client-secret")]
    pub client_secret: Option<String>,

    /// HTTP proxy URL
    #[arg(long = "proxy-url")]
    pub proxy_url: Option<String>,

    /// Proxy username
    #[arg(long = "proxy-username")]
    pub proxy_username: Option<String>,

    /// Proxy password
    #[arg(long = "proxy-password")]
    pub proxy_password: Option<String>,

    /// Workspace directory for report artifacts and the run-result file
    #[arg(long = "workspace", default_value = ".")]
    pub workspace: PathBuf,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Load test id to run
    #[arg(long = "test-id")]
    pub test_id: u32,

    /// Ask the service to send a completion email
    #[arg(long = "send-email")]
    pub send_email: bool,

    /// Skip the PDF report download
    #[arg(long = "skip-pdf-report")]
    pub skip_pdf_report: bool,

    /// Enable debug logging
    #[arg(long = "debug")]
    pub debug: bool,
}

#[derive(Args, Debug)]
pub struct TrendingArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Test id whose run result to evaluate (locates the handoff file)
    #[arg(long = "test-id")]
    pub test_id: u32,

    /// Number of runs kept in the trending history
    #[arg(long = "runs-count", default_value_t = 5)]
    pub runs_count: u32,

    /// Benchmark run id; 0 compares against the previous run
    #[arg(long = "benchmark", default_value_t = 0)]
    pub benchmark: u32,

    /// Average-TRT improvement threshold, percent
    #[arg(long = "avg-improvement", default_value_t = 5)]
    pub avg_improvement: u32,

    /// Average-TRT minor regression threshold, percent
    #[arg(long = "avg-minor-regression", default_value_t = 5)]
    pub avg_minor_regression: u32,

    /// Average-TRT major regression threshold, percent
    #[arg(long = "avg-major-regression", default_value_t = 10)]
    pub avg_major_regression: u32,

    /// Percentile-TRT improvement threshold, percent
    #[arg(long = "pctl-improvement", default_value_t = 5)]
    pub pctl_improvement: u32,

    /// Percentile-TRT minor regression threshold, percent
    #[arg(long = "pctl-minor-regression", default_value_t = 5)]
    pub pctl_minor_regression: u32,

    /// Percentile-TRT major regression threshold, percent
    #[arg(long = "pctl-major-regression", default_value_t = 10)]
    pub pctl_major_regression: u32,

    /// Enable debug logging
    #[arg(long = "debug")]
    pub debug: bool,
}

// Run status polling
pub const TEST_RUN_POLL_INTERVAL_SECS: u64 = 10;
pub const TEST_RUN_MAX_TRANSIENT_RETRIES: u32 = 5;
pub const TEST_RUN_MAX_LOGIN_RETRIES: u32 = 3;

// Stop-after-cancellation wait (wall clock, not a retry count: remote
// stop latency is not bounded by a fixed number of polls)
pub const STOP_WAIT_CEILING_SECS: u64 = 180;

// Report generation polling
pub const REPORT_POLL_INTERVAL_SECS: u64 = 5;
pub const REPORT_MAX_RETRIES: u32 = 6;
pub const PDF_REPORT_MAX_RETRIES: u32 = 24; // pdf generation can take minutes

pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Prefix of every report artifact file name.
pub const REPORT_FILE_PREFIX: &str = "perfcloud_report";

/// Timing and retry-budget knobs. These are configuration, not hidden
/// constants — tests shrink them to milliseconds.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub poll_interval: Duration,
    pub max_transient_retries: u32,
    pub max_login_retries: u32,
    pub stop_wait_ceiling: Duration,
    pub report_poll_interval: Duration,
    pub report_max_retries: u32,
    pub pdf_report_max_retries: u32,
    pub request_timeout: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(TEST_RUN_POLL_INTERVAL_SECS),
            max_transient_retries: TEST_RUN_MAX_TRANSIENT_RETRIES,
            max_login_retries: TEST_RUN_MAX_LOGIN_RETRIES,
            stop_wait_ceiling: Duration::from_secs(STOP_WAIT_CEILING_SECS),
            report_poll_interval: Duration::from_secs(REPORT_POLL_INTERVAL_SECS),
            report_max_retries: REPORT_MAX_RETRIES,
            pdf_report_max_retries: PDF_REPORT_MAX_RETRIES,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Basic { username: String, password: String },
    OAuth { client_id: String, client_secret: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Resolved server connection settings. Built once at startup from the
/// CLI surface — the "where does config come from" question lives
/// entirely at this seam.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub url: Url,
    pub tenant_id: String,
    pub project_id: u32,
    pub auth: AuthMethod,
    pub proxy: Option<ProxyConfig>,
    pub workspace: PathBuf,
}

impl ServerConfig {
    pub fn from_args(args: &ServerArgs) -> anyhow::Result<Self> {
        let url = Url::parse(&args.server_url)
            .map_err(|e| anyhow::anyhow!("invalid server url {:?}: {e}", args.server_url))?;

        let auth = match (&args.client_id, &args.client_secret) {
            (Some(client_id), Some(client_secret)) => AuthMethod::OAuth {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            },
            (None, None) => match (&args.username, &args.password) {
                (Some(username), Some(password)) => AuthMethod::Basic {
                    username: username.clone(),
                    password: password.clone(),
                },
                _ => anyhow::bail!(
                    "credentials required: either --client-id/--client-secret or --username/--password"
                ),
            },
            _ => anyhow::bail!("--client-id and --client-secret must be given together"),
        };

        let proxy = args.proxy_url.as_ref().map(|proxy_url| ProxyConfig {
            url: proxy_url.clone(),
            username: args.proxy_username.clone(),
            password: args.proxy_password.clone(),
        });

        Ok(Self {
            url,
            tenant_id: args.tenant_id.clone(),
            project_id: args.project_id,
            auth,
            proxy,
            workspace: args.workspace.clone(),
        })
    }

    /// Browser URL of the run's report page.
    pub fn report_url(&self, run_id: u32) -> String {
        format!(
            "{}run-overview/{}/report/?TENANTID={}&projectId={}",
            self.url, run_id, self.tenant_id, self.project_id
        )
    }

    /// Browser URL of the run's live dashboard.
    pub fn dashboard_url(&self, run_id: u32) -> String {
        format!(
            "{}run-overview/{}/dashboard/?TENANTID={}&projectId={}",
            self.url, run_id, self.tenant_id, self.project_id
        )
    }
}

impl RunArgs {
    pub fn identity(&self, server: &ServerConfig) -> RunIdentity {
        RunIdentity {
            test_id: self.test_id,
            project_id: server.project_id,
            tenant_id: server.tenant_id.clone(),
        }
    }

    pub fn options(&self) -> RunOptions {
        RunOptions {
            send_email: self.send_email,
            skip_pdf_report: self.skip_pdf_report,
            debug_logging: self.debug,
        }
    }
}

impl TrendingArgs {
    pub fn thresholds(&self) -> TrendingThresholds {
        TrendingThresholds::new(
            self.runs_count,
            self.benchmark,
            MetricThresholds::new(
                self.avg_improvement,
                self.avg_minor_regression,
                self.avg_major_regression,
            ),
            MetricThresholds::new(
                self.pctl_improvement,
                self.pctl_minor_regression,
                self.pctl_major_regression,
            ),
        )
    }
}
