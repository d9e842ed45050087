//! The single background loop that consumes the job queue.
//!
//! The [`Worker`] takes one job at a time, marks it running, drives it
//! through a [`TrainingAgent`] and writes the outcome back to the store. A
//! per-job failure never ends the loop: it is logged, the job is marked
//! failed where possible, and the loop backs off briefly before polling
//! again. The loop exits when its shutdown token fires and hands the queue
//! consumer back so the worker can be started again.

mod registry;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent::{TrainingAgent, TrainingFailure};
use crate::engine::ContainerRuntime;
use crate::error::{JobError, Result, TrainbotError};
use crate::job::config::{JobConfig, TrainingDefaults};
use crate::job::{ExecutionRecord, Job, JobId, JobStatus};
use crate::queue::{JobConsumer, JobStore};

pub use registry::CancellationRegistry;

type Outcome = std::result::Result<ExecutionRecord, TrainingFailure>;

/// Sole consumer of the job queue and sole writer of running and terminal
/// transitions, apart from cancellation.
pub struct Worker<R: ContainerRuntime + 'static> {
    runtime: Arc<R>,
    consumer: JobConsumer,
    defaults: TrainingDefaults,
    registry: CancellationRegistry,
    shutdown: CancellationToken,
    error_backoff: Duration,
}

impl<R: ContainerRuntime + 'static> Worker<R> {
    /// Assemble a worker around a queue consumer.
    #[must_use]
    pub const fn new(
        runtime: Arc<R>,
        consumer: JobConsumer,
        defaults: TrainingDefaults,
        registry: CancellationRegistry,
        shutdown: CancellationToken,
        error_backoff: Duration,
    ) -> Self {
        Self {
            runtime,
            consumer,
            defaults,
            registry,
            shutdown,
            error_backoff,
        }
    }

    /// Poll the queue until the shutdown token fires, then return the
    /// consumer.
    pub async fn run(mut self) -> JobConsumer {
        info!("worker started");
        loop {
            let next = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                next = self.consumer.dequeue() => next,
            };
            let Some(job) = next else {
                continue;
            };

            let job_id = job.id().clone();
            let failed = match self.process(job).await {
                Ok(()) => false,
                Err(error) => {
                    error!(job_id = %job_id, error = %error, "error processing job");
                    self.mark_failed(&job_id, &error);
                    true
                }
            };
            if failed {
                tokio::select! {
                    () = self.shutdown.cancelled() => break,
                    () = tokio::time::sleep(self.error_backoff) => {}
                }
            }
        }
        info!("worker stopped");
        self.consumer
    }

    async fn process(&self, job: Job) -> Result<()> {
        let job_id = job.id().clone();
        if job.status() != JobStatus::Pending {
            debug!(job_id = %job_id, status = %job.status(), "skipping job that is no longer pending");
            return Ok(());
        }

        let token = self.registry.register(&job_id);
        let result = self.execute(&job_id, token).await;
        self.registry.remove(&job_id);
        result
    }

    async fn execute(&self, job_id: &JobId, token: CancellationToken) -> Result<()> {
        let started = match self.store().modify(job_id, |record| record.start(Utc::now())) {
            Ok(started) => started,
            Err(TrainbotError::Job(JobError::InvalidTransition { .. })) => {
                info!(job_id = %job_id, "job left the pending state before it started; skipping");
                return Ok(());
            }
            Err(error) => return Err(error),
        };
        info!(job_id = %job_id, "job started");

        let config = JobConfig::resolve(&started, &self.defaults)?;
        let runtime = Arc::clone(&self.runtime);
        let shutdown = self.shutdown.clone();
        let agent_job_id = job_id.clone();
        let handle = tokio::spawn(async move {
            let mut agent = TrainingAgent::new(&*runtime, agent_job_id, config)
                .with_cancellation(token)
                .with_shutdown(shutdown);
            agent.run().await
        });

        let outcome = handle.await.map_err(|join_error| JobError::WorkerUnavailable {
            message: format!("training task ended abnormally: {join_error}"),
        })?;
        self.record_outcome(job_id, outcome);
        Ok(())
    }

    fn record_outcome(&self, job_id: &JobId, outcome: Outcome) {
        let now = Utc::now();
        let stored = self.store().modify(job_id, |record| {
            if record.status().is_terminal() {
                record.attach_execution(match outcome {
                    Ok(execution) => execution,
                    Err(failure) => failure.record,
                });
                return Ok(());
            }
            match outcome {
                Ok(execution) => record.succeed(now, execution),
                Err(failure) => record.fail(now, failure.error.to_string(), failure.record),
            }
        });

        match stored {
            Ok(record) => match record.status() {
                JobStatus::Success => info!(job_id = %job_id, "job completed successfully"),
                JobStatus::Failed => warn!(
                    job_id = %job_id,
                    error = record.error().unwrap_or_default(),
                    retries = record.retry_count(),
                    "job failed"
                ),
                status => info!(job_id = %job_id, %status, "job finished with status preserved"),
            },
            Err(error) => warn!(job_id = %job_id, error = %error, "could not record job outcome"),
        }
    }

    fn mark_failed(&self, job_id: &JobId, error: &TrainbotError) {
        let now = Utc::now();
        let result = self.store().modify(job_id, |record| {
            if record.status() == JobStatus::Running {
                record.fail(now, error.to_string(), ExecutionRecord::default())?;
            }
            Ok(())
        });
        if let Err(store_error) = result {
            debug!(job_id = %job_id, error = %store_error, "could not mark job failed");
        }
    }

    const fn store(&self) -> &JobStore {
        self.consumer.store()
    }
}
