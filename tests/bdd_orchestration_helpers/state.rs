//! Scenario state for orchestration behavioural tests.

use std::sync::Arc;

use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use trainbot::job::{JobSpec, JobView};

use crate::scripted_runtime::ScriptedRuntime;

/// What the submission step produced.
#[derive(Debug, Clone)]
pub(crate) enum SubmissionResult {
    /// The job reached this final state.
    Finished(JobView),
    /// `submit` refused the job.
    Rejected(String),
}

#[derive(Default, ScenarioState)]
pub(crate) struct OrchestrationState {
    pub(crate) exit_code: Slot<i64>,
    pub(crate) hangs: Slot<bool>,
    pub(crate) spec: Slot<JobSpec>,
    pub(crate) engine: Slot<Arc<ScriptedRuntime>>,
    pub(crate) result: Slot<SubmissionResult>,
    pub(crate) log_lines: Slot<Vec<String>>,
}

#[fixture]
pub(crate) fn orchestration_state() -> OrchestrationState {
    let state = OrchestrationState::default();
    state.exit_code.set(0);
    state.hangs.set(false);
    state.spec.set(JobSpec::default());
    state
}
