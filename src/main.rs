//! `trainbot` application entry point.
//!
//! This binary submits training jobs to a container engine and follows them
//! to completion. It uses `eyre` for opaque error handling at the application
//! boundary, converting domain-specific errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/trainbot/config.toml` or path from `TRAINBOT_CONFIG_PATH`)
//! 3. Environment variables (`TRAINBOT_*`)
//! 4. Command-line arguments

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Report, Result as EyreResult};
use mockable::DefaultEnv;
use tracing::{info, warn};
use trainbot::api::Orchestrator;
use trainbot::config::{AppConfig, Cli, Commands, RunArgs, load_config};
use trainbot::engine::{self, ContainerRuntime, EngineEndpoint};
use trainbot::error::{ContainerError, Result as TrainbotResult};
use trainbot::job::{JobId, JobSpec, JobStatus, JobView};
use trainbot::logging;

/// Interval at which `run` re-reads the job record.
const FOLLOW_INTERVAL: Duration = Duration::from_secs(1);

/// Application entry point.
///
/// Loads configuration, installs logging, then dispatches to the subcommand
/// handler on a multi-threaded Tokio runtime.
fn main() -> EyreResult<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(&cli).map_err(Report::from)?;
    logging::init(config.log_level.as_deref()).map_err(Report::from)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            Report::from(ContainerError::RuntimeCreationFailed {
                message: e.to_string(),
            })
        })?;

    match &cli.command {
        Commands::Run(args) => {
            let view = runtime.block_on(run_job(&config, args)).map_err(Report::from)?;
            print_view(&view)?;
            Ok(if view.status == JobStatus::Success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Check => {
            runtime
                .block_on(check_engine(&config))
                .map_err(Report::from)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Submit one job, follow it until it reaches a terminal state, and stop
/// the worker. Ctrl-C cancels the job.
async fn run_job(config: &AppConfig, args: &RunArgs) -> TrainbotResult<JobView> {
    let (endpoint, origin) =
        EngineEndpoint::resolve(config.engine_socket.as_deref(), &DefaultEnv::new());
    info!(endpoint = %endpoint, %origin, "connecting to container engine");
    let docker = engine::connect(&endpoint).await?;

    let mut orchestrator = Orchestrator::new(Arc::new(docker), config)?;
    orchestrator.start()?;

    let receipt = orchestrator.submit(JobSpec::from(args)).await?;
    let job_id = JobId::from(receipt.job_id.as_str());
    info!(job_id = %job_id, "job submitted; following until it finishes");

    let followed = follow(&orchestrator, &job_id).await;
    orchestrator.stop().await?;
    followed
}

async fn follow<R: ContainerRuntime + 'static>(
    orchestrator: &Orchestrator<R>,
    job_id: &JobId,
) -> TrainbotResult<JobView> {
    let mut interrupt = std::pin::pin!(tokio::signal::ctrl_c());
    let mut interrupted = false;
    let mut ticker = tokio::time::interval(FOLLOW_INTERVAL);

    loop {
        tokio::select! {
            signal = &mut interrupt, if !interrupted => {
                interrupted = true;
                if let Err(error) = signal {
                    warn!(error = %error, "could not listen for Ctrl-C");
                } else {
                    warn!(job_id = %job_id, "interrupted; cancelling job");
                    if let Err(error) = orchestrator.cancel(job_id) {
                        warn!(job_id = %job_id, error = %error, "cancel rejected");
                    }
                }
            }
            _ = ticker.tick() => {}
        }

        let view = orchestrator.get(job_id)?;
        if view.status.is_terminal() {
            return Ok(view);
        }
    }
}

/// Resolve the engine endpoint, connect, and ping it.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn check_engine(config: &AppConfig) -> TrainbotResult<()> {
    let (endpoint, origin) =
        EngineEndpoint::resolve(config.engine_socket.as_deref(), &DefaultEnv::new());
    println!("Engine socket: {endpoint} (from {origin})");

    let docker = engine::open(&endpoint)?;
    engine::ping(&docker, &endpoint).await?;
    println!("Engine is responding.");
    Ok(())
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn print_view(view: &JobView) -> EyreResult<()> {
    let rendered = serde_json::to_string_pretty(view)?;
    println!("{rendered}");
    Ok(())
}
