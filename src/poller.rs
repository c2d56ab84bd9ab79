use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::PollingConfig;
use crate::error::{ApiError, RunnerError};
use crate::gateway::ApiGateway;
use crate::model::{RunIdentity, RunOptions, TestRun};

/// Drives a single test run from "not started" to a terminal status.
pub struct RunPoller<'a> {
    gateway: &'a dyn ApiGateway,
    config: &'a PollingConfig,
}

impl<'a> RunPoller<'a> {
    pub fn new(gateway: &'a dyn ApiGateway, config: &'a PollingConfig) -> Self {
        Self { gateway, config }
    }

    /// Request a new run of the identified load test.
    pub async fn start(
        &self,
        identity: &RunIdentity,
        options: &RunOptions,
    ) -> Result<TestRun, RunnerError> {
        info!("Fetching load test #{} ...", identity.test_id);
        let load_test = self
            .gateway
            .get_load_test(identity)
            .await
            .map_err(start_failure)?;

        info!("Starting load test {:?} ...", load_test.name);
        let run_id = self
            .gateway
            .start_run(identity, options)
            .await
            .map_err(start_failure)?;
        info!("Test run #{run_id} started.");

        Ok(TestRun::new(run_id, load_test.id, load_test.name))
    }

    /// Poll until the shared run reaches a terminal status.
    ///
    /// Transient errors and auth expiry are retried against their own
    /// consecutive budgets; a successful poll resets both. On budget
    /// exhaustion the last known snapshot travels with the error so the
    /// caller still has something to report.
    pub async fn await_terminal(&self, run: &Arc<RwLock<TestRun>>) -> Result<(), RunnerError> {
        let run_id = run.read().await.id;
        let mut transient_retries = 0u32;
        let mut login_retries = 0u32;

        loop {
            if run.read().await.status.is_terminal() {
                return Ok(());
            }
            sleep(self.config.poll_interval).await;

            match self.gateway.get_run_status(run_id).await {
                Ok(snapshot) => {
                    let mut run = run.write().await;
                    run.apply_status(&snapshot);
                    info!("Run #{run_id}: {}", run.status);
                    transient_retries = 0;
                    login_retries = 0;
                }
                Err(ApiError::AuthExpired) => {
                    if login_retries >= self.config.max_login_retries {
                        error!(
                            "Login retried {} times, failed.",
                            self.config.max_login_retries
                        );
                        return Err(RunnerError::LoginExhausted {
                            attempts: login_retries,
                        });
                    }
                    login_retries += 1;
                    warn!(
                        "Authentication expired, logging in again ({login_retries}/{}) ...",
                        self.config.max_login_retries
                    );
                    if let Err(e) = self.gateway.login().await {
                        error!("Login failed: {e}");
                    }
                }
                Err(ApiError::Transient(msg)) => {
                    transient_retries += 1;
                    warn!("Failed to fetch test run status: {msg}");
                    if transient_retries >= self.config.max_transient_retries {
                        error!("Retried {transient_retries} times, abort");
                        let last = run.read().await.clone();
                        return Err(RunnerError::PollExhausted {
                            attempts: transient_retries,
                            last: Box::new(last),
                        });
                    }
                    warn!(
                        "Error occurred during test running, retrying ... {transient_retries}/{}",
                        self.config.max_transient_retries
                    );
                }
                Err(e @ ApiError::Fatal(_)) => return Err(e.into()),
            }
        }
    }
}

/// A rejected start request (bad test id, insufficient licenses) is a
/// `StartFailed`; anything else keeps its gateway classification.
fn start_failure(e: ApiError) -> RunnerError {
    match e {
        ApiError::Fatal(msg) => RunnerError::StartFailed(msg),
        other => RunnerError::Api(other),
    }
}
