use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::config::{AuthMethod, PollingConfig, ServerConfig};
use crate::error::ApiError;
use crate::gateway::{ApiGateway, LoadTestInfo, ReportFormat, ReportStatus};
use crate::model::{
    parse_duration_secs, strip_throughput_unit, RunIdentity, RunOptions, RunStatistics, RunStatus,
    StatusSnapshot, TransactionStats,
};

/// Client initiator tag sent with start-run requests.
const INITIATOR: &str = "ci-runner";

enum Session {
    /// Basic login returns a CSRF token carried as a cookie.
    Cookie(String),
    /// OAuth login returns a bearer token.
    Bearer(String),
}

/// Production [`ApiGateway`] over HTTP.
///
/// Owns the session token; `login()` refreshes it in place so retry loops
/// can re-authenticate without rebuilding the client.
pub struct CloudClient {
    http: reqwest::Client,
    config: ServerConfig,
    session: RwLock<Option<Session>>,
}

impl CloudClient {
    pub fn new(config: ServerConfig, polling: &PollingConfig) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder().timeout(polling.request_timeout);
        if let Some(proxy_config) = &config.proxy {
            let mut proxy = reqwest::Proxy::all(&proxy_config.url)
                .map_err(|e| ApiError::Fatal(format!("invalid proxy url: {e}")))?;
            if let (Some(user), Some(pass)) = (&proxy_config.username, &proxy_config.password) {
                proxy = proxy.basic_auth(user, pass);
            }
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| ApiError::Fatal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            config,
            session: RwLock::new(None),
        })
    }

    /// Every API URL carries the tenant and project as query parameters.
    fn api_url(&self, path: &str) -> Result<Url, ApiError> {
        let mut url = self
            .config
            .url
            .join(path)
            .map_err(|e| ApiError::Fatal(format!("invalid api path {path:?}: {e}")))?;
        url.query_pairs_mut()
            .append_pair("TENANTID", &self.config.tenant_id)
            .append_pair("projectId", &self.config.project_id.to_string());
        Ok(url)
    }

    async fn apply_session(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &*self.session.read().await {
            Some(Session::Bearer(token)) => req.bearer_auth(token),
            Some(Session::Cookie(token)) => {
                req.header("Cookie", format!("SSO_COOKIE_KEY={token}"))
            }
            None => req,
        }
    }

    async fn get(&self, path: &str) -> Result<Response, ApiError> {
        let url = self.api_url(path)?;
        let req = self.apply_session(self.http.get(url)).await;
        Ok(req.send().await?)
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<Response, ApiError> {
        let url = self.api_url(path)?;
        let req = self.apply_session(self.http.post(url)).await;
        Ok(req.json(payload).send().await?)
    }

    async fn put(&self, path: &str, payload: &Value) -> Result<Response, ApiError> {
        let url = self.api_url(path)?;
        let req = self.apply_session(self.http.put(url)).await;
        Ok(req.json(payload).send().await?)
    }

    /// Classify a non-success response and extract the body for context.
    async fn fail(context: &str, response: Response) -> ApiError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let body = body.chars().take(512).collect::<String>();
        classify_status(status, &format!("{context}: {status}, {body}"))
    }

    async fn read_json(context: &str, response: Response) -> Result<Value, ApiError> {
        if !response.status().is_success() {
            return Err(Self::fail(context, response).await);
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::Fatal(format!("{context}: malformed response: {e}")))
    }
}

fn classify_status(status: StatusCode, message: &str) -> ApiError {
    if status == StatusCode::UNAUTHORIZED {
        ApiError::AuthExpired
    } else if status.is_server_error() {
        ApiError::Transient(message.to_string())
    } else {
        ApiError::Fatal(message.to_string())
    }
}

fn opt_f64(value: &Value, key: &str) -> f64 {
    value.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn opt_u32(value: &Value, key: &str) -> u32 {
    value.get(key).and_then(Value::as_u64).unwrap_or(0) as u32
}

fn opt_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

/// The service reports epoch-millisecond timestamps as strings in some
/// payloads and numbers in others.
fn opt_millis(value: &Value, key: &str) -> Option<i64> {
    match value.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn parse_status_snapshot(value: &Value) -> StatusSnapshot {
    // The detailed UI status carries the full vocabulary; the plain
    // status field is a coarser fallback.
    let status_str = value
        .get("uiStatus")
        .or_else(|| value.get("detailedStatus"))
        .or_else(|| value.get("status"))
        .and_then(Value::as_str)
        .unwrap_or("");
    StatusSnapshot {
        status: RunStatus::parse(status_str),
        has_report: value
            .get("hasReport")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        start_time: opt_millis(value, "startTime"),
        end_time: opt_millis(value, "endTime"),
    }
}

#[async_trait]
impl ApiGateway for CloudClient {
    async fn login(&self) -> Result<(), ApiError> {
        let (path, payload, bearer) = match &self.config.auth {
            AuthMethod::Basic { username, password } => (
                "v1/auth",
                json!({ "user": username, "password": password }),
                false,
            ),
            AuthMethod::OAuth {
                client_id,
                client_secret,
            } => (
                "v1/auth-client",
                json!({ "client_id": client_id, "client_secret": client_secret }),
                true,
            ),
        };

        let response = self.post(path, &payload).await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            // A rejected login is not an expired session; surface it as-is.
            return Err(ApiError::Fatal(format!(
                "login to {} failed: {status}, {body}",
                self.config.url
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Fatal(format!("login: malformed response: {e}")))?;
        let Some(token) = body.get("token").and_then(Value::as_str) else {
            return Err(ApiError::Fatal(format!(
                "login to {} failed, invalid response",
                self.config.url
            )));
        };
        let session = if bearer {
            Session::Bearer(token.to_string())
        } else {
            Session::Cookie(token.to_string())
        };
        *self.session.write().await = Some(session);
        Ok(())
    }

    async fn get_load_test(&self, identity: &RunIdentity) -> Result<LoadTestInfo, ApiError> {
        let path = format!(
            "v1/projects/{}/load-tests/{}",
            identity.project_id, identity.test_id
        );
        let response = self.get(&path).await?;
        let body = Self::read_json(&format!("failed to fetch load test {}", identity.test_id), response)
            .await?;
        Ok(LoadTestInfo {
            id: identity.test_id,
            name: opt_str(&body, "name").to_string(),
        })
    }

    async fn start_run(
        &self,
        identity: &RunIdentity,
        options: &RunOptions,
    ) -> Result<u32, ApiError> {
        let path = format!(
            "v1/projects/{}/load-tests/{}/runs",
            identity.project_id, identity.test_id
        );
        let mut url = self.api_url(&path)?;
        url.query_pairs_mut()
            .append_pair("sendEmail", &options.send_email.to_string())
            .append_pair("initiator", INITIATOR);
        let req = self.apply_session(self.http.post(url)).await;
        let response = req.json(&json!({})).send().await?;
        let body = Self::read_json(
            &format!("failed to start test run for load test {}", identity.test_id),
            response,
        )
        .await?;
        body.get("runId")
            .and_then(Value::as_u64)
            .map(|id| id as u32)
            .ok_or_else(|| ApiError::Fatal(format!("no runId in start response: {body}")))
    }

    async fn get_run_status(&self, run_id: u32) -> Result<StatusSnapshot, ApiError> {
        let response = self.get(&format!("v1/test-runs/{run_id}/status")).await?;
        let body =
            Self::read_json(&format!("failed to fetch status for run {run_id}"), response).await?;
        debug!("run #{run_id} status payload: {body}");
        Ok(parse_status_snapshot(&body))
    }

    async fn stop_run(&self, run_id: u32) -> Result<(), ApiError> {
        let path = format!("v1/test-runs/{run_id}");
        let mut url = self.api_url(&path)?;
        url.query_pairs_mut().append_pair("action", "STOP");
        let req = self.apply_session(self.http.put(url)).await;
        let response = req.json(&json!({})).send().await?;
        if !response.status().is_success() {
            return Err(Self::fail(&format!("failed to stop run {run_id}"), response).await);
        }
        Ok(())
    }

    async fn get_run_statistics(&self, run_id: u32) -> Result<RunStatistics, ApiError> {
        let response = self.get(&format!("v1/test-runs/{run_id}/results")).await?;
        let body = Self::read_json(
            &format!("failed to fetch test run results for run {run_id}"),
            response,
        )
        .await?;
        debug!("run #{run_id} results payload: {body}");

        let duration_sec = parse_duration_secs(opt_str(&body, "duration")).unwrap_or(0);
        let script_errors = opt_f64(&body, "scriptErrors");
        let errors_per_sec = if duration_sec > 0 {
            script_errors / duration_sec as f64
        } else {
            0.0
        };
        Ok(RunStatistics {
            run_id,
            vusers: opt_u32(&body, "totalVusers"),
            duration_sec,
            percentile: opt_u32(&body, "percentileValue"),
            avg_throughput: strip_throughput_unit(opt_str(&body, "averageThroughput")),
            total_throughput: strip_throughput_unit(opt_str(&body, "totalThroughput")),
            avg_hits: opt_str(&body, "averageHits")
                .strip_suffix(" hits/s")
                .and_then(|s| s.parse().ok())
                .unwrap_or(-1.0),
            total_hits: opt_f64(&body, "totalHits"),
            tx_passed: opt_u32(&body, "totalTransactionsPassed"),
            tx_failed: opt_u32(&body, "totalTransactionsFailed"),
            errors_per_sec,
            transactions: Vec::new(),
        })
    }

    async fn get_transaction_stats(
        &self,
        run_id: u32,
    ) -> Result<Vec<TransactionStats>, ApiError> {
        let response = self
            .get(&format!("v1/test-runs/{run_id}/transactions"))
            .await?;
        let body = Self::read_json(
            &format!("failed to fetch transactions for run {run_id}"),
            response,
        )
        .await?;
        let Some(items) = body.as_array() else {
            return Err(ApiError::Fatal(format!(
                "malformed transactions payload for run {run_id}"
            )));
        };
        Ok(items
            .iter()
            .map(|tx| TransactionStats {
                name: opt_str(tx, "name").to_string(),
                script: opt_str(tx, "scriptName").to_string(),
                min: opt_f64(tx, "minTRT"),
                max: opt_f64(tx, "maxTRT"),
                avg: opt_f64(tx, "avgTRT"),
                percentile_value: opt_f64(tx, "percentileTRT"),
                breach_count: opt_f64(tx, "breakers"),
                sla_threshold: opt_f64(tx, "slaThreshold"),
            })
            .collect())
    }

    async fn request_report(&self, run_id: u32, format: ReportFormat) -> Result<u32, ApiError> {
        let response = self
            .post(
                &format!("v1/test-runs/{run_id}/reports"),
                &json!({ "reportType": format.as_str() }),
            )
            .await?;
        let body = Self::read_json(
            &format!("failed to request {format} report for run {run_id}"),
            response,
        )
        .await?;
        body.get("reportId")
            .and_then(Value::as_u64)
            .map(|id| id as u32)
            .ok_or_else(|| ApiError::Fatal(format!("no reportId in report response: {body}")))
    }

    async fn get_report_status(&self, report_id: u32) -> Result<ReportStatus, ApiError> {
        let response = self.get(&format!("v1/test-runs/reports/{report_id}")).await?;
        let status = response.status();
        if !status.is_success() {
            // Not-ready reports answer with a non-2xx until generation
            // finishes; report that as pending rather than an error.
            debug!("report #{report_id} not ready: {status}");
            return Ok(ReportStatus::Pending);
        }
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if content_type.contains("application/json") {
            let body: Value = response
                .json()
                .await
                .map_err(|e| ApiError::Fatal(format!("report status: malformed response: {e}")))?;
            if opt_str(&body, "message") == "In progress" {
                return Ok(ReportStatus::Pending);
            }
            return Ok(ReportStatus::Failed(format!(
                "report {report_id} invalid status: {body}"
            )));
        }
        if content_type.contains("application/octet-stream") {
            return Ok(ReportStatus::Ready);
        }
        Ok(ReportStatus::Failed(format!(
            "unknown content type: {content_type}"
        )))
    }

    async fn download_report(&self, report_id: u32) -> Result<Bytes, ApiError> {
        let response = self.get(&format!("v1/test-runs/reports/{report_id}")).await?;
        if !response.status().is_success() {
            return Err(Self::fail(&format!("failed to download report {report_id}"), response).await);
        }
        Ok(response.bytes().await?)
    }
}
