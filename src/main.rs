mod artifacts;
mod client;
mod config;
mod error;
mod gateway;
mod handoff;
mod interruption;
mod model;
mod poller;
mod runner;
mod trending;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use client::CloudClient;
use config::{CliArgs, Command, PollingConfig, RunArgs, ServerConfig, TrendingArgs};
use gateway::ApiGateway;
use runner::Runner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let debug = match &args.command {
        Command::Run(run_args) => run_args.debug,
        Command::Trending(trending_args) => trending_args.debug,
    };
    let default_filter = if debug {
        "perfcloud_runner=debug"
    } else {
        "perfcloud_runner=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    info!("Starting perfcloud-runner v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Run(run_args) => run_command(run_args).await,
        Command::Trending(trending_args) => trending_command(trending_args).await,
    }
}

async fn run_command(args: RunArgs) -> anyhow::Result<()> {
    let server = ServerConfig::from_args(&args.server)?;
    let polling = PollingConfig::default();
    let identity = args.identity(&server);

    let client = CloudClient::new(server.clone(), &polling)?;
    client.login().await?;

    // Job abort (ctrl-c) transfers control to the interruption handler;
    // a second signal kills the process the hard way.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let runner = Runner::new(&client, &polling, &server, args.options());
    let run = match runner.run(&identity, cancel_rx).await {
        Ok(run) => run,
        Err(error::RunnerError::PollExhausted { attempts, last }) => {
            // Best-effort diagnostics: the last snapshot is still written
            // out even though the run never reached a terminal status.
            error!("Status polling gave up after {attempts} retries");
            write_outputs(&server, &args, &last)?;
            anyhow::bail!("test run #{} did not reach a terminal status", last.id);
        }
        Err(e) => return Err(e.into()),
    };

    write_outputs(&server, &args, &run)?;

    if run.status.is_success() {
        Ok(())
    } else {
        anyhow::bail!("test run #{} ended with {} status", run.id, run.status)
    }
}

/// Write report artifacts and the handoff file into the workspace.
fn write_outputs(
    server: &ServerConfig,
    args: &RunArgs,
    run: &model::TestRun,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(&server.workspace)?;
    for (file_name, content) in &run.report_artifacts {
        let path = server.workspace.join(file_name);
        match std::fs::write(&path, content) {
            Ok(()) => info!("Report file {} created.", path.display()),
            Err(e) => error!("Failed to create report file {}: {e}", path.display()),
        }
    }

    let path = handoff::save(&server.workspace, args.test_id, &args.options(), run)?;
    info!("Run result written to {}", path.display());
    Ok(())
}

async fn trending_command(args: TrendingArgs) -> anyhow::Result<()> {
    let server = ServerConfig::from_args(&args.server)?;
    let polling = PollingConfig::default();
    let thresholds = args.thresholds();

    let build_result = handoff::load(&server.workspace, args.test_id)?;
    let run = build_result.test_run;
    if !run.status.is_terminal() {
        anyhow::bail!("run #{} has not ended, cannot evaluate trending", run.id);
    }
    if !run.has_report {
        warn!("Run #{} has no results; trending will be empty", run.id);
    }

    let client = CloudClient::new(server.clone(), &polling)?;
    client.login().await?;

    let runner = Runner::new(&client, &polling, &server, build_result.test_options);
    let result = runner.fetch_trending(&run, &thresholds).await?;

    let file_name = format!(
        "perfcloud_trending_{}-{}.json",
        server.tenant_id, result.current.run_id
    );
    let path = server.workspace.join(&file_name);
    std::fs::write(&path, serde_json::to_string_pretty(&result)?)?;
    info!("Trending result written to {}", path.display());

    match &result.aggregate {
        Some(aggregate) => info!(
            "Trending vs run #{}: avg {:?} ({:+.1}%), percentile {:?} ({:+.1}%)",
            result.benchmark_run_id.unwrap_or_default(),
            aggregate.avg_class,
            aggregate.avg_delta_pct,
            aggregate.pctl_class,
            aggregate.pctl_delta_pct
        ),
        None => info!("No benchmark available; run #{} is the baseline", run.id),
    }

    Ok(())
}
