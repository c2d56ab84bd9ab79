use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::config::PollingConfig;
use crate::gateway::ApiGateway;
use crate::model::{RunIdentity, RunStatus, TestRun};

/// Reacts to an external cancellation by stopping the remote run and
/// waiting — bounded by wall clock, not a retry count — for the stop to
/// take effect.
pub struct InterruptionHandler<'a> {
    gateway: &'a dyn ApiGateway,
    config: &'a PollingConfig,
    flags: &'a InterruptionFlags,
}

impl<'a> InterruptionHandler<'a> {
    pub fn new(
        gateway: &'a dyn ApiGateway,
        config: &'a PollingConfig,
        flags: &'a InterruptionFlags,
    ) -> Self {
        Self {
            gateway,
            config,
            flags,
        }
    }

    /// Stop the run and wait for a terminal status.
    ///
    /// Returns the observed terminal status, or `Unknown` when the
    /// wall-clock ceiling elapses first — never silently a success. The
    /// run is read and updated through the shared handle, so this is safe
    /// to call from a different task than the one that was polling. The
    /// outcome is recorded in the interruption flag store either way, for
    /// a later recovery pass to reconcile.
    pub async fn on_cancel(
        &self,
        identity: &RunIdentity,
        run: Arc<RwLock<TestRun>>,
    ) -> RunStatus {
        let run_id = run.read().await.id;
        info!("Aborting test run #{run_id} ...");

        if let Err(e) = self.gateway.stop_run(run_id).await {
            // The stop may still land remotely; keep watching either way.
            error!("Stop request for run #{run_id} failed: {e}");
        }

        let deadline = Instant::now() + self.config.stop_wait_ceiling;
        let outcome = loop {
            let status = run.read().await.status;
            if status.is_terminal() {
                break status;
            }
            if Instant::now() >= deadline {
                warn!(
                    "Run #{run_id} did not stop within {:?}; \
                     check the run on the service website, manual intervention may be required",
                    self.config.stop_wait_ceiling
                );
                break RunStatus::Unknown;
            }
            sleep(self.config.poll_interval).await;
            match self.gateway.get_run_status(run_id).await {
                Ok(snapshot) => run.write().await.apply_status(&snapshot),
                Err(e) => warn!("Failed to fetch run status while stopping: {e}"),
            }
        };

        info!("Test run #{run_id} interruption outcome: {outcome}");
        if let Err(e) = self.flags.record(identity.test_id, outcome) {
            error!("Failed to record interruption outcome: {e}");
        }
        outcome
    }
}

/// Cross-process interruption flags, one file per test id.
///
/// Exactly one writer — the process that observed (or failed to observe)
/// the stop — and any number of readers. A recovery pass running in a
/// different process reads the outcome with [`peek`](Self::peek) and
/// consumes it with [`take`](Self::take). The presence of a flag also
/// signals "an orchestration for this test id ended abnormally", which
/// callers use to serialize runs per test id.
pub struct InterruptionFlags {
    dir: PathBuf,
}

const FLAG_DIR: &str = ".perfcloud_flags";
const FLAG_SUFFIX: &str = "_INTERRUPTION";

impl InterruptionFlags {
    pub fn new(workspace: &Path) -> Self {
        Self {
            dir: workspace.join(FLAG_DIR),
        }
    }

    fn flag_path(&self, test_id: u32) -> PathBuf {
        self.dir.join(format!("{test_id}{FLAG_SUFFIX}"))
    }

    /// Record an interruption outcome for a test id, overwriting any
    /// previous flag.
    pub fn record(&self, test_id: u32, outcome: RunStatus) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.flag_path(test_id), outcome.as_str())
    }

    /// Read the recorded outcome without consuming it.
    pub fn peek(&self, test_id: u32) -> Option<RunStatus> {
        let content = std::fs::read_to_string(self.flag_path(test_id)).ok()?;
        Some(RunStatus::parse(content.trim()))
    }

    /// Read and clear the recorded outcome.
    pub fn take(&self, test_id: u32) -> Option<RunStatus> {
        let outcome = self.peek(test_id)?;
        if let Err(e) = std::fs::remove_file(self.flag_path(test_id)) {
            warn!("Failed to clear interruption flag for test {test_id}: {e}");
        }
        Some(outcome)
    }
}
