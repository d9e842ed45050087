//! Given/when steps for orchestration scenarios.

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest_bdd_macros::{given, when};
use trainbot::api::Orchestrator;
use trainbot::config::AppConfig;
use trainbot::job::{JobId, JobSpec, JobView};

use super::StepResult;
use super::state::{OrchestrationState, SubmissionResult};
use crate::scripted_runtime::{Behaviour, ScriptedRuntime};

const FOLLOW_LIMIT: Duration = Duration::from_secs(15);
const FOLLOW_TICK: Duration = Duration::from_millis(20);

#[given("a container engine whose training exits with code {code}")]
fn given_engine_exits(orchestration_state: &OrchestrationState, code: i64) {
    orchestration_state.exit_code.set(code);
    orchestration_state.hangs.set(false);
}

#[given("a container engine whose training never finishes")]
fn given_engine_hangs(orchestration_state: &OrchestrationState) {
    orchestration_state.hangs.set(true);
}

#[given("a job with {epochs} epochs allowing {retries} retries")]
fn given_job(orchestration_state: &OrchestrationState, epochs: u32, retries: u32) {
    orchestration_state.spec.set(JobSpec {
        epochs,
        max_retries: retries,
        ..JobSpec::default()
    });
}

#[when("the job is submitted and followed to completion")]
fn when_submitted_and_followed(orchestration_state: &OrchestrationState) -> StepResult<()> {
    let spec = orchestration_state
        .spec
        .get()
        .ok_or_else(|| String::from("job should be configured"))?;
    let engine = Arc::new(ScriptedRuntime::new(vec![behaviour(
        orchestration_state,
        &spec,
    )?]));
    orchestration_state.engine.set(Arc::clone(&engine));

    let log_dir = tempfile::tempdir().map_err(|e| format!("failed to create log dir: {e}"))?;
    let config = config_for(&log_dir)?;
    let runtime =
        tokio::runtime::Runtime::new().map_err(|e| format!("failed to create runtime: {e}"))?;

    let result = runtime.block_on(async {
        let mut orchestrator =
            Orchestrator::new(engine, &config).map_err(|e| e.to_string())?;
        orchestrator.start().map_err(|e| e.to_string())?;
        let outcome = match orchestrator.submit(spec).await {
            Ok(receipt) => follow(&orchestrator, &receipt).await.map(SubmissionResult::Finished),
            Err(error) => Ok(SubmissionResult::Rejected(error.to_string())),
        };
        orchestrator.stop().await.map_err(|e| e.to_string())?;
        outcome
    })?;

    if let SubmissionResult::Finished(view) = &result {
        orchestration_state.log_lines.set(read_log(view)?);
    }
    orchestration_state.result.set(result);
    Ok(())
}

#[when("the job is submitted and cancelled before the worker starts")]
fn when_submitted_and_cancelled(orchestration_state: &OrchestrationState) -> StepResult<()> {
    let spec = orchestration_state
        .spec
        .get()
        .ok_or_else(|| String::from("job should be configured"))?;
    let engine = Arc::new(ScriptedRuntime::new(vec![behaviour(
        orchestration_state,
        &spec,
    )?]));
    orchestration_state.engine.set(Arc::clone(&engine));

    let log_dir = tempfile::tempdir().map_err(|e| format!("failed to create log dir: {e}"))?;
    let config = config_for(&log_dir)?;
    let runtime =
        tokio::runtime::Runtime::new().map_err(|e| format!("failed to create runtime: {e}"))?;

    let view = runtime.block_on(async {
        let mut orchestrator =
            Orchestrator::new(engine, &config).map_err(|e| e.to_string())?;
        let receipt = orchestrator.submit(spec).await.map_err(|e| e.to_string())?;
        let id = JobId::from(receipt.job_id.as_str());
        orchestrator.cancel(&id).map_err(|e| e.to_string())?;

        orchestrator.start().map_err(|e| e.to_string())?;
        tokio::time::sleep(FOLLOW_TICK * 5).await;
        orchestrator.stop().await.map_err(|e| e.to_string())?;
        orchestrator.get(&id).map_err(|e| e.to_string())
    })?;

    orchestration_state
        .result
        .set(SubmissionResult::Finished(view));
    Ok(())
}

fn behaviour(orchestration_state: &OrchestrationState, spec: &JobSpec) -> StepResult<Behaviour> {
    if orchestration_state.hangs.get().unwrap_or(false) {
        return Ok(Behaviour::Hang);
    }
    let code = orchestration_state
        .exit_code
        .get()
        .ok_or_else(|| String::from("exit code should be configured"))?;
    let lines = usize::try_from(spec.epochs).map_err(|e| e.to_string())?;
    Ok(Behaviour::exit_after_lines(lines, code))
}

fn config_for(log_dir: &tempfile::TempDir) -> StepResult<AppConfig> {
    let mut config = AppConfig::default();
    config.training.log_dir = Utf8PathBuf::from_path_buf(log_dir.path().to_path_buf())
        .map_err(|path| format!("log dir is not UTF-8: {}", path.display()))?;
    config.training.timeout_secs = 1;
    config.training.retry_delay_secs = 0;
    config.training.idle_poll_ms = 20;
    config.queue.poll_interval_ms = 10;
    config.worker.error_backoff_ms = 10;
    Ok(config)
}

async fn follow(orchestrator: &Orchestrator<ScriptedRuntime>, receipt: &JobView) -> StepResult<JobView> {
    let id = JobId::from(receipt.job_id.as_str());
    let deadline = tokio::time::Instant::now() + FOLLOW_LIMIT;
    loop {
        let view = orchestrator.get(&id).map_err(|e| e.to_string())?;
        if view.status.is_terminal() {
            return Ok(view);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(format!("job still {} after {FOLLOW_LIMIT:?}", view.status));
        }
        tokio::time::sleep(FOLLOW_TICK).await;
    }
}

fn read_log(view: &JobView) -> StepResult<Vec<String>> {
    let Some(path) = view.log_file.as_deref() else {
        return Ok(Vec::new());
    };
    let contents =
        std::fs::read_to_string(path).map_err(|e| format!("failed to read {path}: {e}"))?;
    Ok(contents.lines().map(String::from).collect())
}
