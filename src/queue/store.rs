//! Thread-safe in-memory job store.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{JobError, Result};
use crate::job::{Job, JobId};

/// Shared mapping from job id to its canonical record.
///
/// Clones share the same underlying map. The lock guards only the mapping;
/// records handed out by [`JobStore::get`] and [`JobStore::list`] are
/// snapshots.
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl JobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a record by id.
    pub fn put(&self, job: Job) {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.insert(job.id().clone(), job);
    }

    /// Return a snapshot of the record, if present.
    #[must_use]
    pub fn get(&self, id: &JobId) -> Option<Job> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.get(id).cloned()
    }

    /// Overwrite a record only if its id is already present.
    ///
    /// Returns whether the record was written; a missing id is not an error.
    pub fn update(&self, job: Job) -> bool {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        match jobs.get_mut(job.id()) {
            Some(slot) => {
                *slot = job;
                true
            }
            None => false,
        }
    }

    /// Delete a record if present.
    pub fn remove(&self, id: &JobId) -> Option<Job> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.remove(id)
    }

    /// Return a snapshot of every record.
    #[must_use]
    pub fn list(&self) -> Vec<Job> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        jobs.values().cloned().collect()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true when the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `change` to the stored record under the write lock.
    ///
    /// The record is only replaced when `change` succeeds, so a rejected
    /// transition leaves it untouched. Returns the updated snapshot.
    ///
    /// # Errors
    ///
    /// Returns `JobError::NotFound` when the id is absent, or whatever error
    /// `change` reports.
    pub fn modify<F>(&self, id: &JobId, change: F) -> Result<Job>
    where
        F: FnOnce(&mut Job) -> Result<()>,
    {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let slot = jobs.get_mut(id).ok_or_else(|| JobError::NotFound {
            id: id.to_string(),
        })?;
        let mut updated = slot.clone();
        change(&mut updated)?;
        *slot = updated.clone();
        Ok(updated)
    }
}
