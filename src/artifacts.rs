use std::fmt::Write as _;

use bytes::Bytes;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::{PollingConfig, ServerConfig, REPORT_FILE_PREFIX};
use crate::error::ApiError;
use crate::gateway::{ApiGateway, ReportFormat, ReportStatus};
use crate::model::{RunIdentity, RunOptions, RunStatus, TestRun, TransactionStats};

/// Downloads report artifacts for a terminal run.
///
/// Each format is collected independently; one format failing (timeout,
/// rejected generation, bad handle) only logs and moves on, so a partial
/// artifact map is a normal result.
pub struct ArtifactCollector<'a> {
    gateway: &'a dyn ApiGateway,
    config: &'a PollingConfig,
    server: &'a ServerConfig,
    options: &'a RunOptions,
}

impl<'a> ArtifactCollector<'a> {
    pub fn new(
        gateway: &'a dyn ApiGateway,
        config: &'a PollingConfig,
        server: &'a ServerConfig,
        options: &'a RunOptions,
    ) -> Self {
        Self {
            gateway,
            config,
            server,
            options,
        }
    }

    /// Fill `run.report_artifacts`. Expects a terminal run; a run with
    /// no results only gets the locally generated XML summary.
    pub async fn collect(&self, identity: &RunIdentity, run: &mut TestRun) {
        if !run.status.is_terminal() {
            warn!(
                "Run #{} is not ended yet ({}), skip downloading reports",
                run.id, run.status
            );
            return;
        }

        if run.has_report {
            let mut formats = vec![ReportFormat::Csv];
            if self.options.skip_pdf_report {
                info!("PDF report is skipped");
            } else {
                formats.push(ReportFormat::Pdf);
            }

            // Formats are independent, so their request/poll/download
            // cycles run concurrently; each failure stays its own.
            let run_id = run.id;
            let downloads = formats
                .into_iter()
                .map(|format| async move { (format, self.fetch_report(run_id, format).await) });
            for (format, result) in futures::future::join_all(downloads).await {
                match result {
                    Ok(content) => {
                        let file_name = report_file_name(identity, run_id, format.extension());
                        info!("Report {file_name} downloaded.");
                        run.report_artifacts.insert(file_name, content);
                    }
                    Err(e) => {
                        warn!("Failed to download {format} report for run #{run_id}: {e}");
                    }
                }
            }

            match self.gateway.get_transaction_stats(run.id).await {
                Ok(transactions) => {
                    let file_name = transaction_csv_file_name(identity, run.id);
                    run.report_artifacts
                        .insert(file_name, transaction_csv_bytes(&transactions));
                }
                Err(e) => {
                    warn!("Failed to fetch transactions for run #{}: {e}", run.id);
                }
            }
        } else {
            info!("Test run #{} doesn't have run results.", run.id);
        }

        let report_url = self.server.report_url(run.id);
        let dashboard_url = self.server.dashboard_url(run.id);
        info!("View report at: {report_url}");
        info!("View dashboard at: {dashboard_url}");
        run.report_artifacts.insert(
            report_file_name(identity, run.id, "xml"),
            xml_summary(run, &report_url, &dashboard_url),
        );
    }

    /// Request generation of one report and poll until it is ready,
    /// bounded by a per-format retry budget.
    async fn fetch_report(&self, run_id: u32, format: ReportFormat) -> Result<Bytes, ApiError> {
        let report_id = self.gateway.request_report(run_id, format).await?;
        let max_retries = match format {
            ReportFormat::Pdf => self.config.pdf_report_max_retries,
            _ => self.config.report_max_retries,
        };

        let mut attempts = 0u32;
        loop {
            match self.gateway.get_report_status(report_id).await? {
                ReportStatus::Ready => {
                    info!("Report #{report_id} is ready.");
                    return self.gateway.download_report(report_id).await;
                }
                ReportStatus::Failed(msg) => return Err(ApiError::Fatal(msg)),
                ReportStatus::Pending => {
                    attempts += 1;
                    if attempts >= max_retries {
                        return Err(ApiError::Transient(format!(
                            "report #{report_id} is not ready after {attempts} retries"
                        )));
                    }
                    info!("Report #{report_id} is not ready yet...");
                    sleep(self.config.report_poll_interval).await;
                }
            }
        }
    }
}

pub fn report_file_name(identity: &RunIdentity, run_id: u32, ext: &str) -> String {
    format!(
        "{REPORT_FILE_PREFIX}_{}-{}.{}",
        identity.tenant_id, run_id, ext
    )
}

pub fn transaction_csv_file_name(identity: &RunIdentity, run_id: u32) -> String {
    format!(
        "{REPORT_FILE_PREFIX}_trans_{}-{}.csv",
        identity.tenant_id, run_id
    )
}

/// Render the per-transaction breakdown as CSV.
pub fn transaction_csv_bytes(transactions: &[TransactionStats]) -> Bytes {
    let mut out = String::from(
        "Script Name, Transaction, Breach Count, Avg Duration, Min, Max, Percentile, SLA Threshold\n",
    );
    for tx in transactions {
        let _ = writeln!(
            out,
            "{}, {}, {}, {}, {}, {}, {}, {}",
            tx.script,
            tx.name,
            tx.breach_count,
            tx.avg,
            tx.min,
            tx.max,
            tx.percentile_value,
            tx.sla_threshold
        );
    }
    Bytes::from(out)
}

/// JUnit-style XML summary of the run, consumable by CI test-report
/// publishers. Always generated, even when the service produced no
/// report.
pub fn xml_summary(run: &TestRun, report_url: &str, dashboard_url: &str) -> Bytes {
    let is_failure = run.status != RunStatus::Passed;
    let time = run.duration_secs().unwrap_or(0.0);

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        xml,
        "<testsuite name=\"{}\" tests=\"1\" failures=\"{}\">",
        escape_xml(&run.load_test_name),
        if is_failure { 1 } else { 0 }
    );
    xml.push_str("  <properties>\n");
    let _ = writeln!(
        xml,
        "    <property name=\"generator\" value=\"perfcloud-runner\"/>"
    );
    let _ = writeln!(
        xml,
        "    <property name=\"testId\" value=\"{}\"/>",
        run.load_test_id
    );
    let _ = writeln!(xml, "    <property name=\"runId\" value=\"{}\"/>", run.id);
    let _ = writeln!(
        xml,
        "    <property name=\"statusDescription\">{}</property>",
        escape_xml(run.status.as_str())
    );
    if run.status.is_terminal() {
        let _ = writeln!(
            xml,
            "    <property name=\"reportUrl\" value=\"{}\"/>",
            escape_xml(report_url)
        );
        let _ = writeln!(
            xml,
            "    <property name=\"dashboardUrl\" value=\"{}\"/>",
            escape_xml(dashboard_url)
        );
    }
    xml.push_str("  </properties>\n");
    let _ = writeln!(
        xml,
        "  <testcase name=\"{}\" status=\"{}\" time=\"{time:.2}\">",
        escape_xml(&run.load_test_name),
        run.status
    );
    if is_failure {
        let _ = writeln!(
            xml,
            "    <failure message=\"Test run status is {}\" type=\"{}\"/>",
            run.status, run.status
        );
    }
    xml.push_str("  </testcase>\n</testsuite>\n");

    Bytes::from(xml)
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
