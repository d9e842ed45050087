//! Job records, lifecycle status, and their serialisable projection.
//!
//! A [`Job`] is created in the `pending` state when a [`JobSpec`] is
//! submitted, moved to `running` by the worker, and finally into one of the
//! terminal states. Terminal records are never modified again, and
//! `completed_at` is populated exactly when the status is terminal.

pub mod config;

use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigError, JobError, Result};

const SHORT_ID_LEN: usize = 8;

/// Opaque, caller-visible job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return a short prefix suitable for container and file names.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..SHORT_ID_LEN).unwrap_or(&self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(String::from(value))
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted and waiting in the queue.
    Pending,
    /// Picked up by the worker; a container attempt is in progress.
    Running,
    /// The workload exited with status zero.
    Success,
    /// Every attempt failed or the job could not be run.
    Failed,
    /// Cancelled by a caller before it finished.
    Cancelled,
}

impl JobStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Running,
        Self::Success,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Returns true for `success`, `failed`, and `cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// Returns true when `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::Cancelled)
                | (Self::Running, Self::Success | Self::Failed | Self::Cancelled)
        )
    }

    /// Lowercase wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| JobError::InvalidStatus {
                value: String::from(value),
            })
    }
}

/// Parameters supplied when a training job is submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSpec {
    /// Number of training epochs.
    pub epochs: u32,
    /// Training batch size.
    pub batch_size: u32,
    /// Optimiser learning rate.
    pub learning_rate: f64,
    /// Request a GPU runtime for the container.
    pub gpu: bool,
    /// Optional GPU device selector, e.g. `"0,1"`.
    pub gpu_ids: Option<String>,
    /// Additional attempts allowed after the first one fails.
    pub max_retries: u32,
}

impl Default for JobSpec {
    fn default() -> Self {
        Self {
            epochs: 5,
            batch_size: 32,
            learning_rate: 0.001,
            gpu: false,
            gpu_ids: None,
            max_retries: 3,
        }
    }
}

impl JobSpec {
    /// Check that the parameters describe a runnable job.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when epochs or batch size are zero,
    /// or when the learning rate is not a positive finite number.
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(invalid("epochs", "must be greater than zero"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be greater than zero"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(invalid("learning_rate", "must be a positive number"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> crate::error::TrainbotError {
    ConfigError::InvalidValue {
        field: String::from(field),
        reason: String::from(reason),
    }
    .into()
}

/// What the controller left behind for a job: its last container and log file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionRecord {
    /// Identifier of the most recently started container.
    pub container_id: Option<String>,
    /// Host path of the most recent attempt's log file.
    pub log_file: Option<Utf8PathBuf>,
    /// Number of retries consumed.
    pub retry_count: u32,
}

/// Canonical in-memory record of one training job.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    id: JobId,
    spec: JobSpec,
    status: JobStatus,
    error: Option<String>,
    container_id: Option<String>,
    log_file: Option<Utf8PathBuf>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    retry_count: u32,
}

impl Job {
    /// Create a pending record stamped with the current time.
    #[must_use]
    pub fn new(id: JobId, spec: JobSpec) -> Self {
        Self::with_created_at(id, spec, Utc::now())
    }

    /// Create a pending record with an explicit creation time.
    #[must_use]
    pub const fn with_created_at(id: JobId, spec: JobSpec, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            spec,
            status: JobStatus::Pending,
            error: None,
            container_id: None,
            log_file: None,
            created_at,
            started_at: None,
            completed_at: None,
            retry_count: 0,
        }
    }

    /// Move a pending job to `running`.
    ///
    /// # Errors
    ///
    /// Returns `JobError::InvalidTransition` unless the job is pending.
    pub fn start(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(at);
        Ok(())
    }

    /// Record a successful run.
    ///
    /// # Errors
    ///
    /// Returns `JobError::InvalidTransition` unless the job is running.
    pub fn succeed(&mut self, at: DateTime<Utc>, record: ExecutionRecord) -> Result<()> {
        self.transition(JobStatus::Success)?;
        self.attach_execution(record);
        self.completed_at = Some(at);
        Ok(())
    }

    /// Record a failed run with a human-readable reason.
    ///
    /// # Errors
    ///
    /// Returns `JobError::InvalidTransition` unless the job is running.
    pub fn fail(
        &mut self,
        at: DateTime<Utc>,
        message: impl Into<String>,
        record: ExecutionRecord,
    ) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.attach_execution(record);
        self.error = Some(message.into());
        self.completed_at = Some(at);
        Ok(())
    }

    /// Cancel a pending or running job.
    ///
    /// # Errors
    ///
    /// Returns `JobError::InvalidTransition` when the job is already terminal.
    pub fn cancel(&mut self, at: DateTime<Utc>, reason: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Cancelled)?;
        self.error = Some(reason.into());
        self.completed_at = Some(at);
        Ok(())
    }

    fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                id: self.id.to_string(),
                from: self.status.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        self.status = next;
        Ok(())
    }

    /// Copy the container, log file, and retry count of a run onto the job.
    ///
    /// The status is left alone, so this also applies to a job that was
    /// cancelled while its container was running.
    pub fn attach_execution(&mut self, record: ExecutionRecord) {
        if record.container_id.is_some() {
            self.container_id = record.container_id;
        }
        if record.log_file.is_some() {
            self.log_file = record.log_file;
        }
        self.retry_count = record.retry_count;
    }

    /// Job identifier.
    #[must_use]
    pub const fn id(&self) -> &JobId {
        &self.id
    }

    /// Submitted parameters.
    #[must_use]
    pub const fn spec(&self) -> &JobSpec {
        &self.spec
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> JobStatus {
        self.status
    }

    /// Failure or cancellation message, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Identifier of the container that last ran this job.
    #[must_use]
    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    /// Host path of the last attempt's log file.
    #[must_use]
    pub const fn log_file(&self) -> Option<&Utf8PathBuf> {
        self.log_file.as_ref()
    }

    /// Submission time.
    #[must_use]
    pub const fn created(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time the worker picked the job up.
    #[must_use]
    pub const fn started(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Time the job reached a terminal status.
    #[must_use]
    pub const fn completed(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Retries consumed so far.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }
}

/// Serialisable projection of a [`Job`] handed to presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView {
    /// Job identifier.
    pub job_id: String,
    /// Lowercase status name.
    pub status: JobStatus,
    /// Number of training epochs.
    pub epochs: u32,
    /// Training batch size.
    pub batch_size: u32,
    /// Optimiser learning rate.
    pub learning_rate: f64,
    /// Whether a GPU was requested.
    pub gpu: bool,
    /// GPU device selector.
    pub gpu_ids: Option<String>,
    /// Failure or cancellation message.
    pub error: Option<String>,
    /// Container identifier.
    pub container_id: Option<String>,
    /// Log file path.
    pub log_file: Option<String>,
    /// ISO-8601 submission time.
    pub created_at: String,
    /// ISO-8601 start time.
    pub started_at: Option<String>,
    /// ISO-8601 completion time.
    pub completed_at: Option<String>,
    /// Retries consumed.
    pub retry_count: u32,
    /// Retry budget.
    pub max_retries: u32,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status,
            epochs: job.spec.epochs,
            batch_size: job.spec.batch_size,
            learning_rate: job.spec.learning_rate,
            gpu: job.spec.gpu,
            gpu_ids: job.spec.gpu_ids.clone(),
            error: job.error.clone(),
            container_id: job.container_id.clone(),
            log_file: job.log_file.as_ref().map(ToString::to_string),
            created_at: job.created_at.to_rfc3339(),
            started_at: job.started_at.map(|at| at.to_rfc3339()),
            completed_at: job.completed_at.map(|at| at.to_rfc3339()),
            retry_count: job.retry_count,
            max_retries: job.spec.max_retries,
        }
    }
}
