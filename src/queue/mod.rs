//! Job store and the bounded FIFO queue that feeds the worker.
//!
//! The queue carries job ids only; the [`JobStore`] owns record state.
//! [`JobQueue::enqueue`] writes the store entry before pushing the id so a
//! consumer never dequeues an id whose record is missing.

mod store;

use std::time::Duration;

use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tracing::debug;

use crate::error::{QueueError, Result};
use crate::job::{Job, JobId};

pub use store::JobStore;

/// Producer side of the bounded job queue.
#[derive(Debug, Clone)]
pub struct JobQueue {
    store: JobStore,
    sender: mpsc::Sender<JobId>,
    capacity: usize,
    enqueue_timeout: Duration,
}

/// Consumer side of the bounded job queue, owned by the worker.
#[derive(Debug)]
pub struct JobConsumer {
    store: JobStore,
    receiver: mpsc::Receiver<JobId>,
    poll_interval: Duration,
}

impl JobQueue {
    /// Create a queue holding at most `capacity` entries.
    ///
    /// `enqueue_timeout` bounds how long a producer waits for space;
    /// `poll_interval` bounds each consumer wait on an empty queue.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when `capacity` is zero.
    pub fn bounded(
        store: JobStore,
        capacity: usize,
        enqueue_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<(Self, JobConsumer)> {
        if capacity == 0 {
            return Err(crate::error::ConfigError::InvalidValue {
                field: String::from("queue.capacity"),
                reason: String::from("must be greater than zero"),
            }
            .into());
        }

        let (sender, receiver) = mpsc::channel(capacity);
        let queue = Self {
            store: store.clone(),
            sender,
            capacity,
            enqueue_timeout,
        };
        let consumer = JobConsumer {
            store,
            receiver,
            poll_interval,
        };
        Ok((queue, consumer))
    }

    /// Store `job` and append its id to the queue.
    ///
    /// The store entry is written first and is left in place when the queue
    /// stays full for the whole enqueue timeout.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Full` on timeout and `QueueError::Closed` when
    /// the consumer has been dropped.
    pub async fn enqueue(&self, job: Job) -> Result<()> {
        let id = job.id().clone();
        self.store.put(job);

        match self.sender.send_timeout(id, self.enqueue_timeout).await {
            Ok(()) => {
                debug!(depth = self.depth(), "job enqueued");
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => Err(QueueError::Full {
                capacity: self.capacity,
            }
            .into()),
            Err(SendTimeoutError::Closed(_)) => Err(QueueError::Closed.into()),
        }
    }

    /// Number of ids currently waiting in the queue.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.sender
            .max_capacity()
            .saturating_sub(self.sender.capacity())
    }

    /// Fixed queue capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl JobConsumer {
    /// Wait up to the poll interval for the next job.
    ///
    /// Returns `None` when the queue stayed empty, when it is closed, or when
    /// the dequeued id no longer has a store record. None of these are errors;
    /// callers simply poll again.
    pub async fn dequeue(&mut self) -> Option<Job> {
        let id = match tokio::time::timeout(self.poll_interval, self.receiver.recv()).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                // Every producer is gone; pace the caller's polling loop.
                tokio::time::sleep(self.poll_interval).await;
                return None;
            }
            Err(_) => return None,
        };
        let job = self.store.get(&id);
        if job.is_none() {
            debug!(job_id = %id, "dequeued id has no record; skipping");
        }
        job
    }

    /// The store shared with the producer side.
    #[must_use]
    pub const fn store(&self) -> &JobStore {
        &self.store
    }
}
