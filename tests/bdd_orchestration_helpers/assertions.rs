//! Assertion helpers for orchestration behavioural tests.

use rstest_bdd_macros::then;
use trainbot::job::{JobStatus, JobView};

use super::StepResult;
use super::state::{OrchestrationState, SubmissionResult};

fn finished(orchestration_state: &OrchestrationState) -> StepResult<JobView> {
    match orchestration_state.result.get() {
        Some(SubmissionResult::Finished(view)) => Ok(view),
        Some(SubmissionResult::Rejected(message)) => {
            Err(format!("expected a finished job, submission was rejected: {message}"))
        }
        None => Err(String::from("result should be set")),
    }
}

#[then("the job status is {expected}")]
fn job_status_is(orchestration_state: &OrchestrationState, expected: JobStatus) -> StepResult<()> {
    let view = finished(orchestration_state)?;
    if view.status == expected {
        Ok(())
    } else {
        Err(format!(
            "expected {expected}, got {} (error: {:?})",
            view.status, view.error
        ))
    }
}

#[then("the retry count is {expected}")]
fn retry_count_is(orchestration_state: &OrchestrationState, expected: u32) -> StepResult<()> {
    let view = finished(orchestration_state)?;
    if view.retry_count == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} retries, got {}", view.retry_count))
    }
}

#[then("the error mentions {text}")]
fn error_mentions(orchestration_state: &OrchestrationState, text: String) -> StepResult<()> {
    let view = finished(orchestration_state)?;
    match view.error {
        Some(error) if error.contains(&text) => Ok(()),
        Some(error) => Err(format!("expected error mentioning '{text}', got '{error}'")),
        None => Err(format!("expected error mentioning '{text}', got none")),
    }
}

#[then("the log file holds {expected} timestamped lines")]
fn log_file_holds(orchestration_state: &OrchestrationState, expected: usize) -> StepResult<()> {
    let lines = orchestration_state
        .log_lines
        .get()
        .ok_or_else(|| String::from("log lines should be captured"))?;
    if lines.len() != expected {
        return Err(format!("expected {expected} lines, got {lines:?}"));
    }
    let unstamped: Vec<&String> = lines
        .iter()
        .filter(|line| {
            line.strip_prefix('[')
                .and_then(|rest| rest.split_once("] "))
                .is_none_or(|(stamp, _)| {
                    chrono::NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S").is_err()
                })
        })
        .collect();
    if unstamped.is_empty() {
        Ok(())
    } else {
        Err(format!("lines without a timestamp: {unstamped:?}"))
    }
}

#[then("every container was killed and removed")]
fn every_container_killed_and_removed(orchestration_state: &OrchestrationState) -> StepResult<()> {
    let engine = orchestration_state
        .engine
        .get()
        .ok_or_else(|| String::from("engine should be set"))?;
    let created = engine.created();
    if created.is_empty() {
        return Err(String::from("no containers were created"));
    }
    if engine.killed() != created {
        return Err(format!("killed {:?}, created {created:?}", engine.killed()));
    }
    if engine.removed() != created {
        return Err(format!("removed {:?}, created {created:?}", engine.removed()));
    }
    Ok(())
}

#[then("{expected} containers were created")]
fn containers_created(orchestration_state: &OrchestrationState, expected: usize) -> StepResult<()> {
    let engine = orchestration_state
        .engine
        .get()
        .ok_or_else(|| String::from("engine should be set"))?;
    let created = engine.created().len();
    if created == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} containers, got {created}"))
    }
}

#[then("the submission is rejected mentioning {text}")]
fn submission_rejected(orchestration_state: &OrchestrationState, text: String) -> StepResult<()> {
    match orchestration_state.result.get() {
        Some(SubmissionResult::Rejected(message)) if message.contains(&text) => Ok(()),
        Some(SubmissionResult::Rejected(message)) => {
            Err(format!("expected rejection mentioning '{text}', got '{message}'"))
        }
        Some(SubmissionResult::Finished(view)) => {
            Err(format!("expected rejection, job finished as {}", view.status))
        }
        None => Err(String::from("result should be set")),
    }
}
