//! Cancellation tokens for jobs that are currently being processed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::job::JobId;

/// Shared map from job id to the token its agent observes.
///
/// The worker registers a token before it marks a job running and removes
/// it once the outcome is stored; the façade fires tokens on cancel.
#[derive(Debug, Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
}

impl CancellationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a fresh token for `id`, replacing any earlier one.
    pub fn register(&self, id: &JobId) -> CancellationToken {
        let token = CancellationToken::new();
        self.lock().insert(id.clone(), token.clone());
        token
    }

    /// Fire the token for `id`. Returns false when no token is registered.
    pub fn cancel(&self, id: &JobId) -> bool {
        self.lock().get(id).map(CancellationToken::cancel).is_some()
    }

    /// Forget the token for `id`.
    pub fn remove(&self, id: &JobId) {
        self.lock().remove(id);
    }

    /// Fire every registered token and return the affected job ids.
    pub fn cancel_all(&self) -> Vec<JobId> {
        self.lock()
            .iter()
            .map(|(id, token)| {
                token.cancel();
                id.clone()
            })
            .collect()
    }

    /// Number of registered tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no token is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
