//! Orchestration façade over the job store, queue and worker.
//!
//! An [`Orchestrator`] is constructed explicitly by the hosting process and
//! owns the worker's lifecycle through [`Orchestrator::start`] and
//! [`Orchestrator::stop`]. Presentation layers call [`Orchestrator::submit`],
//! [`Orchestrator::get`], [`Orchestrator::list`], [`Orchestrator::cancel`] and
//! [`Orchestrator::stats`], and only ever receive [`JobView`] projections.
//!
//! None of these functions print or exit; the CLI adapter decides how to
//! present results.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::engine::ContainerRuntime;
use crate::error::{JobError, Result};
use crate::job::config::TrainingDefaults;
use crate::job::{Job, JobId, JobSpec, JobStatus, JobView};
use crate::queue::{JobConsumer, JobQueue, JobStore};
use crate::worker::{CancellationRegistry, Worker};

/// Number of records returned by [`Orchestrator::list`] without a limit.
pub const DEFAULT_LIST_LIMIT: usize = 50;

const CANCELLED_BY_USER: &str = "cancelled by user";
const CANCELLED_BY_SHUTDOWN: &str = "cancelled by shutdown";

/// Per-status job counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStats {
    /// All records in the store.
    pub total: usize,
    /// Records waiting in the queue.
    pub pending: usize,
    /// Records currently executing.
    pub running: usize,
    /// Records that finished successfully.
    pub success: usize,
    /// Records that finished with a failure.
    pub failed: usize,
    /// Records that were cancelled.
    pub cancelled: usize,
    /// Percentage of finished jobs that succeeded, to two decimals.
    pub success_rate: f64,
}

impl JobStats {
    fn from_jobs(jobs: &[Job]) -> Self {
        let count = |status: JobStatus| jobs.iter().filter(|job| job.status() == status).count();
        let success = count(JobStatus::Success);
        let failed = count(JobStatus::Failed);
        Self {
            total: jobs.len(),
            pending: count(JobStatus::Pending),
            running: count(JobStatus::Running),
            success,
            failed,
            cancelled: count(JobStatus::Cancelled),
            success_rate: success_rate(success, failed),
        }
    }
}

#[expect(
    clippy::float_arithmetic,
    reason = "percentage rounding is inherently floating point"
)]
fn success_rate(success: usize, failed: usize) -> f64 {
    let finished = success.saturating_add(failed);
    if finished == 0 {
        return 0.0;
    }
    let as_f64 = |n: usize| f64::from(u32::try_from(n).unwrap_or(u32::MAX));
    (as_f64(success) / as_f64(finished) * 10_000.0).round() / 100.0
}

struct RunningWorker {
    handle: JoinHandle<JobConsumer>,
    shutdown: CancellationToken,
}

/// Owner of the job store, the queue, and the background worker.
pub struct Orchestrator<R: ContainerRuntime + 'static> {
    runtime: Arc<R>,
    defaults: TrainingDefaults,
    store: JobStore,
    queue: JobQueue,
    consumer: Option<JobConsumer>,
    registry: CancellationRegistry,
    worker: Option<RunningWorker>,
    enqueue_timeout: Duration,
    poll_interval: Duration,
    error_backoff: Duration,
    shutdown_timeout: Duration,
}

impl<R: ContainerRuntime + 'static> Orchestrator<R> {
    /// Build an orchestrator with an empty store and a stopped worker.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the training defaults or the queue
    /// parameters are invalid.
    pub fn new(runtime: Arc<R>, config: &AppConfig) -> Result<Self> {
        let defaults = TrainingDefaults::from_config(config)?;
        let store = JobStore::new();
        let enqueue_timeout = Duration::from_secs(config.queue.enqueue_timeout_secs);
        let poll_interval = Duration::from_millis(config.queue.poll_interval_ms);
        let (queue, consumer) = JobQueue::bounded(
            store.clone(),
            config.queue.capacity,
            enqueue_timeout,
            poll_interval,
        )?;

        Ok(Self {
            runtime,
            defaults,
            store,
            queue,
            consumer: Some(consumer),
            registry: CancellationRegistry::new(),
            worker: None,
            enqueue_timeout,
            poll_interval,
            error_backoff: Duration::from_millis(config.worker.error_backoff_ms),
            shutdown_timeout: Duration::from_secs(config.worker.shutdown_timeout_secs),
        })
    }

    /// Spawn the worker loop. A no-op when it is already running.
    ///
    /// # Errors
    ///
    /// Returns `JobError::WorkerUnavailable` outside a Tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.is_worker_running() {
            warn!("worker already running");
            return Ok(());
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            JobError::WorkerUnavailable {
                message: e.to_string(),
            }
        })?;

        if self.worker.take().is_some() {
            warn!("previous worker ended unexpectedly; rebuilding the queue");
            self.consumer = Some(self.rebuild_queue()?);
        }
        let consumer = match self.consumer.take() {
            Some(consumer) => consumer,
            None => self.rebuild_queue()?,
        };

        let shutdown = CancellationToken::new();
        let worker = Worker::new(
            Arc::clone(&self.runtime),
            consumer,
            self.defaults.clone(),
            self.registry.clone(),
            shutdown.clone(),
            self.error_backoff,
        );
        self.worker = Some(RunningWorker {
            handle: handle.spawn(worker.run()),
            shutdown,
        });
        info!("worker thread started");
        Ok(())
    }

    /// Signal the worker to stop and wait for it, bounded by the configured
    /// shutdown timeout. Jobs still queued stay pending.
    ///
    /// On expiry the in-flight job is cancelled and the loop is aborted.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the queue has to be rebuilt and its
    /// parameters are invalid.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(RunningWorker {
            mut handle,
            shutdown,
        }) = self.worker.take()
        else {
            debug!("worker not running");
            return Ok(());
        };

        info!("stopping worker");
        shutdown.cancel();
        match tokio::time::timeout(self.shutdown_timeout, &mut handle).await {
            Ok(Ok(consumer)) => {
                self.consumer = Some(consumer);
                info!("worker thread stopped");
            }
            Ok(Err(join_error)) => {
                error!(error = %join_error, "worker ended abnormally");
                self.consumer = Some(self.rebuild_queue()?);
            }
            Err(_elapsed) => {
                warn!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "worker did not stop in time; cancelling in-flight jobs"
                );
                handle.abort();
                for job_id in self.registry.cancel_all() {
                    self.mark_cancelled(&job_id, CANCELLED_BY_SHUTDOWN);
                    self.registry.remove(&job_id);
                }
                self.consumer = Some(self.rebuild_queue()?);
            }
        }
        Ok(())
    }

    /// Whether the worker loop is live.
    #[must_use]
    pub fn is_worker_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Validate and queue a new job.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for invalid job parameters and
    /// `QueueError::Full` when no queue slot frees up in time.
    pub async fn submit(&self, spec: JobSpec) -> Result<JobView> {
        spec.validate()?;
        let job = Job::new(JobId::generate(), spec);
        let receipt = JobView::from(&job);
        let job_id = job.id().clone();

        self.queue.enqueue(job).await?;
        info!(
            job_id = %job_id,
            queue_depth = self.queue.depth(),
            "job submitted"
        );
        Ok(receipt)
    }

    /// Fetch one record.
    ///
    /// # Errors
    ///
    /// Returns `JobError::NotFound` for an unknown id.
    pub fn get(&self, id: &JobId) -> Result<JobView> {
        self.store
            .get(id)
            .map(|job| JobView::from(&job))
            .ok_or_else(|| JobError::NotFound { id: id.to_string() }.into())
    }

    /// List records, most recent first, optionally filtered by status name.
    ///
    /// # Errors
    ///
    /// Returns `JobError::InvalidStatus` for an unknown status name.
    pub fn list(&self, status: Option<&str>, limit: Option<usize>) -> Result<Vec<JobView>> {
        let filter = status.map(str::parse::<JobStatus>).transpose()?;
        let mut jobs = self.store.list();
        jobs.sort_by(|a, b| b.created().cmp(&a.created()));

        Ok(jobs
            .iter()
            .filter(|job| filter.is_none_or(|wanted| job.status() == wanted))
            .take(limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .map(JobView::from)
            .collect())
    }

    /// Cancel a pending or running job and signal its agent.
    ///
    /// # Errors
    ///
    /// Returns `JobError::NotFound` for an unknown id and
    /// `JobError::InvalidTransition` when the job already finished.
    pub fn cancel(&self, id: &JobId) -> Result<JobView> {
        let job = self
            .store
            .modify(id, |record| record.cancel(Utc::now(), CANCELLED_BY_USER))?;
        let signalled = self.registry.cancel(id);
        info!(job_id = %id, signalled, "job cancelled");
        Ok(JobView::from(&job))
    }

    /// Per-status counts and the success rate.
    #[must_use]
    pub fn stats(&self) -> JobStats {
        JobStats::from_jobs(&self.store.list())
    }

    /// Jobs currently waiting in the queue.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    fn mark_cancelled(&self, id: &JobId, reason: &str) {
        let now = Utc::now();
        if let Err(error) = self.store.modify(id, |record| record.cancel(now, reason)) {
            debug!(job_id = %id, error = %error, "could not mark job cancelled");
        }
    }

    /// Replace the queue pair after the consumer was lost. Ids still held
    /// by the old channel are dropped; their records stay pending.
    fn rebuild_queue(&mut self) -> Result<JobConsumer> {
        let stranded = self.queue.depth();
        let (queue, consumer) = JobQueue::bounded(
            self.store.clone(),
            self.queue.capacity(),
            self.enqueue_timeout,
            self.poll_interval,
        )?;
        if stranded > 0 {
            warn!(stranded, "queued jobs were dropped with the old queue");
        }
        self.queue = queue;
        Ok(consumer)
    }
}
