use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::{info, warn};

use crate::artifacts::ArtifactCollector;
use crate::config::{PollingConfig, ServerConfig};
use crate::error::RunnerError;
use crate::gateway::ApiGateway;
use crate::interruption::{InterruptionFlags, InterruptionHandler};
use crate::model::{RunIdentity, RunOptions, RunStatistics, TestRun, TrendingThresholds};
use crate::poller::RunPoller;
use crate::trending::{self, TrendingResult};

/// Facade over the run lifecycle: start → poll to terminal → collect
/// artifacts, with interruption recovery; plus the trending evaluation
/// for a completed run.
pub struct Runner<'a> {
    gateway: &'a dyn ApiGateway,
    polling: &'a PollingConfig,
    server: &'a ServerConfig,
    options: RunOptions,
    flags: InterruptionFlags,
}

impl<'a> Runner<'a> {
    pub fn new(
        gateway: &'a dyn ApiGateway,
        polling: &'a PollingConfig,
        server: &'a ServerConfig,
        options: RunOptions,
    ) -> Self {
        let flags = InterruptionFlags::new(&server.workspace);
        Self {
            gateway,
            polling,
            server,
            options,
            flags,
        }
    }

    /// Execute one test run to completion.
    ///
    /// `cancel` is the external cancellation signal (job abort); when it
    /// fires mid-poll, control transfers to the interruption handler,
    /// whose own bounded wait cannot be cut short through the same
    /// channel. Returns the completed run with its collected artifacts,
    /// or the error the caller maps into the CI disposition.
    pub async fn run(
        &self,
        identity: &RunIdentity,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<TestRun, RunnerError> {
        // A leftover flag means a previous orchestration for this test id
        // was interrupted and may not have observed its stop; surface it
        // before starting a new run.
        if let Some(previous) = self.flags.take(identity.test_id) {
            warn!(
                "Previous run of test #{} was interrupted with outcome {previous}; \
                 verify it is not still running on the service",
                identity.test_id
            );
        }

        let poller = RunPoller::new(self.gateway, self.polling);
        let run = Arc::new(RwLock::new(poller.start(identity, &self.options).await?));
        let run_id = run.read().await.id;

        tokio::select! {
            result = poller.await_terminal(&run) => result?,
            _ = cancelled(&mut cancel) => {
                info!("Test run interrupted");
                let handler =
                    InterruptionHandler::new(self.gateway, self.polling, &self.flags);
                let outcome = handler.on_cancel(identity, run.clone()).await;
                return Err(RunnerError::Interrupted { outcome });
            }
        }

        // has_report can lag the terminal status by a poll; refresh once
        // before deciding whether reports exist.
        match self.gateway.get_run_status(run_id).await {
            Ok(snapshot) => run.write().await.apply_status(&snapshot),
            Err(e) => warn!("Failed to refresh status of run #{run_id}: {e}"),
        }

        let mut run = match Arc::try_unwrap(run) {
            Ok(lock) => lock.into_inner(),
            Err(arc) => arc.read().await.clone(),
        };
        info!("Test run #{} ended with {} status.", run.id, run.status);

        ArtifactCollector::new(self.gateway, self.polling, self.server, &self.options)
            .collect(identity, &mut run)
            .await;

        Ok(run)
    }

    /// Evaluate trending for a completed run against the configured
    /// benchmark. A benchmark that cannot be fetched degrades to a
    /// baseline evaluation rather than failing the phase.
    pub async fn fetch_trending(
        &self,
        run: &TestRun,
        thresholds: &TrendingThresholds,
    ) -> Result<TrendingResult, RunnerError> {
        let current = self.fetch_statistics(run.id).await?;
        let benchmark = match thresholds.benchmark_run_id {
            Some(bench_id) => match self.fetch_statistics(bench_id).await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!("Failed to fetch benchmark run #{bench_id}: {e}");
                    None
                }
            },
            None => None,
        };
        Ok(trending::evaluate(current, benchmark, thresholds))
    }

    async fn fetch_statistics(&self, run_id: u32) -> Result<RunStatistics, RunnerError> {
        let mut stats = self.gateway.get_run_statistics(run_id).await?;
        stats.transactions = self.gateway.get_transaction_stats(run_id).await?;
        Ok(stats)
    }

    pub fn interruption_flags(&self) -> &InterruptionFlags {
        &self.flags
    }
}

/// Resolve when the cancellation signal fires. Never resolves if the
/// sender goes away without cancelling.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
