//! Container lifecycle controller for a single training job.
//!
//! A [`TrainingAgent`] drives each attempt through image resolution,
//! container start, log streaming, and the completion wait. Any failure,
//! including a non-zero exit, routes through forced termination and cleanup,
//! then either another attempt after the retry delay or a terminal
//! [`TrainingFailure`]. The attempt count is capped at `max_retries + 1`.
//!
//! Two tokens steer an agent from outside. The cancellation token is observed
//! at every log chunk, every idle poll, during the completion wait, and
//! during the retry delay; on observation the container is killed and no
//! further attempt is made. The shutdown token only lets streaming end early
//! once the container has stopped running.

mod log_sink;

use std::time::Duration;

use camino::Utf8PathBuf;
use futures_util::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{ContainerRuntime, ContainerStatus, CreateContainerRequest, is_not_found};
use crate::error::{ContainerError, Result, TrainbotError, TrainingError};
use crate::job::config::JobConfig;
use crate::job::{ExecutionRecord, JobId};
use log_sink::LogSink;

/// Deadline used when `now + timeout` does not fit in an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Progress of the current attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    /// No attempt has begun, or a retry is about to begin.
    Idle,
    /// The image is present locally.
    ImageReady,
    /// The container was created and started.
    ContainerStarted,
    /// Container output is being copied to the log file.
    Streaming,
    /// The container exited with status zero.
    Completed,
    /// The attempt exceeded its time budget.
    TimedOut,
    /// The attempt failed for any other reason.
    Errored,
}

/// Terminal failure of a job, with whatever the attempts left behind.
#[derive(Debug)]
pub struct TrainingFailure {
    /// Error of the last attempt.
    pub error: TrainbotError,
    /// Container, log file, and retry count of the last attempt.
    pub record: ExecutionRecord,
}

impl TrainingFailure {
    /// Returns true when the job stopped because it was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.error.is_cancelled()
    }
}

/// Per-job controller owning its container for the duration of each attempt.
pub struct TrainingAgent<'a, R: ContainerRuntime + ?Sized> {
    runtime: &'a R,
    job_id: JobId,
    config: JobConfig,
    cancel: CancellationToken,
    shutdown: CancellationToken,
    phase: AttemptPhase,
    container_id: Option<String>,
    last_container_id: Option<String>,
    log_file: Option<Utf8PathBuf>,
    retry_count: u32,
}

impl<'a, R: ContainerRuntime + ?Sized> TrainingAgent<'a, R> {
    /// Create an agent for `job_id` with a resolved configuration.
    #[must_use]
    pub fn new(runtime: &'a R, job_id: JobId, config: JobConfig) -> Self {
        Self {
            runtime,
            job_id,
            config,
            cancel: CancellationToken::new(),
            shutdown: CancellationToken::new(),
            phase: AttemptPhase::Idle,
            container_id: None,
            last_container_id: None,
            log_file: None,
            retry_count: 0,
        }
    }

    /// Observe `token` for user cancellation.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Observe `token` for orchestrator shutdown.
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Current attempt phase.
    #[must_use]
    pub const fn phase(&self) -> AttemptPhase {
        self.phase
    }

    /// Retries consumed so far.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Run attempts until one succeeds, the retry budget is spent, or the
    /// job is cancelled.
    ///
    /// # Errors
    ///
    /// Returns a [`TrainingFailure`] carrying the last attempt's error.
    pub async fn run(&mut self) -> std::result::Result<ExecutionRecord, TrainingFailure> {
        loop {
            let attempt = self.retry_count;
            info!(
                job_id = %self.job_id,
                attempt,
                max_retries = self.config.max_retries,
                "starting training attempt"
            );

            let error = match self.run_attempt(attempt).await {
                Ok(()) => {
                    self.cleanup().await;
                    info!(job_id = %self.job_id, attempt, "training completed successfully");
                    return Ok(self.record());
                }
                Err(error) => error,
            };

            self.phase = if error.is_timeout() {
                AttemptPhase::TimedOut
            } else {
                AttemptPhase::Errored
            };
            warn!(job_id = %self.job_id, attempt, error = %error, "training attempt failed");

            self.force_terminate().await;
            self.cleanup().await;

            if error.is_cancelled() || self.cancel.is_cancelled() {
                info!(job_id = %self.job_id, "job cancelled; not retrying");
                return Err(self.failure(TrainingError::Cancelled.into()));
            }
            if self.retry_count >= self.config.max_retries {
                return Err(self.failure(error));
            }

            self.retry_count = self.retry_count.saturating_add(1);
            info!(
                job_id = %self.job_id,
                retry = self.retry_count,
                delay_secs = self.config.retry_delay.as_secs(),
                "retrying after delay"
            );
            if !self.pause_before_retry().await {
                return Err(self.failure(TrainingError::Cancelled.into()));
            }
        }
    }

    async fn run_attempt(&mut self, attempt: u32) -> Result<()> {
        self.phase = AttemptPhase::Idle;
        self.check_cancelled()?;

        self.ensure_image().await?;
        self.phase = AttemptPhase::ImageReady;
        self.check_cancelled()?;

        let container_id = self.start_container(attempt).await?;
        self.phase = AttemptPhase::ContainerStarted;

        self.stream_logs(&container_id, attempt).await?;
        self.wait_for_completion(&container_id).await?;
        self.phase = AttemptPhase::Completed;
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(TrainingError::Cancelled.into());
        }
        Ok(())
    }

    async fn ensure_image(&self) -> Result<()> {
        let image = &self.config.image;
        let pull_failed = |message: String| {
            TrainbotError::from(ContainerError::ImagePullFailed {
                image: image.clone(),
                message,
            })
        };

        let present = self
            .runtime
            .image_exists(image)
            .await
            .map_err(|e| pull_failed(format!("failed to inspect image: {e}")))?;
        if present {
            debug!(image = %image, "image present locally");
            return Ok(());
        }

        info!(image = %image, "image not found locally; pulling");
        self.runtime
            .pull_image(image)
            .await
            .map_err(|e| pull_failed(e.to_string()))?;
        info!(image = %image, "image pulled");
        Ok(())
    }

    async fn start_container(&mut self, attempt: u32) -> Result<String> {
        let request = CreateContainerRequest::for_attempt(&self.job_id, attempt, &self.config)?;
        let container_id = self
            .runtime
            .create_container(request.options(), request.body())
            .await
            .map_err(|e| ContainerError::CreateFailed {
                message: e.to_string(),
            })?;
        self.container_id = Some(container_id.clone());
        self.last_container_id = Some(container_id.clone());

        self.runtime
            .start_container(&container_id)
            .await
            .map_err(|e| ContainerError::StartFailed {
                container_id: container_id.clone(),
                message: e.to_string(),
            })?;
        info!(
            job_id = %self.job_id,
            container_id = %container_id,
            name = request.name(),
            "container started"
        );
        Ok(container_id)
    }

    async fn stream_logs(&mut self, container_id: &str, attempt: u32) -> Result<()> {
        let mut sink = LogSink::create(&self.config.log_dir, &self.job_id, attempt).await?;
        self.log_file = Some(sink.path().to_owned());
        self.phase = AttemptPhase::Streaming;
        info!(job_id = %self.job_id, log_file = %sink.path(), "streaming container logs");

        let runtime = self.runtime;
        let deadline = deadline_after(self.config.timeout);
        let mut stream = runtime.follow_logs(container_id);
        let mut lines = 0_usize;

        loop {
            let polled = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(TrainingError::Cancelled.into()),
                () = tokio::time::sleep_until(deadline) => return Err(self.timeout_error()),
                polled = tokio::time::timeout(self.config.idle_poll, stream.next()) => polled,
            };

            match polled {
                Ok(Some(Ok(chunk))) => {
                    lines = lines.saturating_add(sink.write_chunk(&chunk).await?);
                }
                Ok(Some(Err(error))) if is_not_found(&error) => {
                    warn!(container_id, error = %error, "container vanished while streaming logs");
                    break;
                }
                Ok(Some(Err(error))) => {
                    return Err(TrainingError::LogStream {
                        container_id: container_id.to_owned(),
                        message: error.to_string(),
                    }
                    .into());
                }
                Ok(None) => break,
                Err(_idle) => {}
            }

            if Instant::now() >= deadline {
                return Err(self.timeout_error());
            }
            if self.shutdown.is_cancelled() && !self.is_running(container_id).await {
                debug!(container_id, "shutdown requested and container stopped");
                break;
            }
        }

        debug!(job_id = %self.job_id, lines, "log stream finished");
        Ok(())
    }

    async fn wait_for_completion(&self, container_id: &str) -> Result<()> {
        let waited = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(TrainingError::Cancelled.into()),
            waited = tokio::time::timeout(
                self.config.timeout,
                self.runtime.wait_container(container_id),
            ) => waited,
        };

        self.capture_tail(container_id).await;

        let code = match waited {
            Ok(Ok(Some(code))) => code,
            Ok(Ok(None)) => {
                return Err(TrainingError::CompletionUnobserved {
                    message: String::from("engine reported no exit code"),
                }
                .into());
            }
            Ok(Err(error)) => {
                return Err(TrainingError::CompletionUnobserved {
                    message: error.to_string(),
                }
                .into());
            }
            Err(_elapsed) => return Err(self.timeout_error()),
        };

        info!(job_id = %self.job_id, container_id, exit_code = code, "container exited");
        if code == 0 {
            Ok(())
        } else {
            Err(TrainingError::NonZeroExit { code }.into())
        }
    }

    async fn capture_tail(&self, container_id: &str) {
        match self
            .runtime
            .tail_logs(container_id, self.config.tail_lines)
            .await
        {
            Ok(tail) => debug!(container_id, tail = %tail.trim_end(), "final container output"),
            Err(error) => debug!(container_id, error = %error, "could not read final output"),
        }
    }

    async fn is_running(&self, container_id: &str) -> bool {
        match self.runtime.container_status(container_id).await {
            Ok(status) => status.is_running(),
            Err(error) if is_not_found(&error) => false,
            Err(error) => {
                debug!(container_id, error = %error, "status check failed; assuming running");
                true
            }
        }
    }

    /// Kill the container if it is still running. Never fails.
    async fn force_terminate(&self) {
        let Some(container_id) = self.container_id.as_deref() else {
            return;
        };

        match self.runtime.container_status(container_id).await {
            Ok(status) if status.is_running() => {
                match self.runtime.kill_container(container_id).await {
                    Ok(()) => info!(container_id, "container killed"),
                    Err(error) => warn!(container_id, error = %error, "failed to kill container"),
                }
            }
            Ok(_) => {}
            Err(error) if is_not_found(&error) => {
                debug!(container_id, "container already gone");
            }
            Err(error) => warn!(container_id, error = %error, "failed to inspect container"),
        }
    }

    /// Remove the container once it has stopped, then forget it. Never fails.
    async fn cleanup(&mut self) {
        let Some(container_id) = self.container_id.take() else {
            return;
        };

        match self.runtime.container_status(&container_id).await {
            Ok(ContainerStatus::Exited | ContainerStatus::Dead | ContainerStatus::Created) => {
                match self.runtime.remove_container(&container_id).await {
                    Ok(()) => debug!(container_id, "container removed"),
                    Err(error) if is_not_found(&error) => {
                        debug!(container_id, "container already removed");
                    }
                    Err(error) => {
                        warn!(container_id, error = %error, "failed to remove container");
                    }
                }
            }
            Ok(status) => {
                warn!(container_id, ?status, "container not stopped; leaving it in place");
            }
            Err(error) if is_not_found(&error) => {
                debug!(container_id, "container already removed");
            }
            Err(error) => warn!(container_id, error = %error, "failed to inspect container"),
        }
    }

    /// Sleep for the retry delay; returns false if cancelled meanwhile.
    async fn pause_before_retry(&self) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(self.config.retry_delay) => true,
        }
    }

    fn timeout_error(&self) -> TrainbotError {
        TrainingError::Timeout {
            seconds: self.config.timeout.as_secs(),
        }
        .into()
    }

    fn record(&self) -> ExecutionRecord {
        ExecutionRecord {
            container_id: self.last_container_id.clone(),
            log_file: self.log_file.clone(),
            retry_count: self.retry_count,
        }
    }

    fn failure(&self, error: TrainbotError) -> TrainingFailure {
        TrainingFailure {
            error,
            record: self.record(),
        }
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}
