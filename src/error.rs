//! Semantic error types for the trainbot orchestrator.
//!
//! This module defines the error hierarchy for trainbot, following the
//! principle of using semantic error enums (via `thiserror`) for conditions the
//! caller might inspect, retry, or map to a status code, while reserving opaque
//! errors (`eyre::Report`) for the application boundary.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors raised while talking to the container engine.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Failed to connect to the container engine socket.
    #[error("failed to connect to container engine: {message}")]
    ConnectionFailed {
        /// A description of the connection failure.
        message: String,
    },

    /// The container engine socket was not found.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// Permission denied when accessing the container engine socket.
    #[error("permission denied accessing container socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: PathBuf,
    },

    /// The image was absent locally and could not be pulled.
    #[error("failed to pull image '{image}': {message}")]
    ImagePullFailed {
        /// The image reference that was requested.
        image: String,
        /// A description of the pull failure.
        message: String,
    },

    /// Failed to create a container.
    #[error("failed to create container: {message}")]
    CreateFailed {
        /// A description of the creation failure.
        message: String,
    },

    /// Failed to start a container.
    #[error("failed to start container '{container_id}': {message}")]
    StartFailed {
        /// The ID of the container that failed to start.
        container_id: String,
        /// A description of the start failure.
        message: String,
    },

    /// Health check failed - engine did not respond correctly.
    #[error("container engine health check failed: {message}")]
    HealthCheckFailed {
        /// A description of the health check failure.
        message: String,
    },

    /// Health check timed out.
    #[error("container engine health check timed out after {seconds} seconds")]
    HealthCheckTimeout {
        /// The timeout duration in seconds.
        seconds: u64,
    },

    /// Failed to create the async runtime used by synchronous helpers.
    #[error("failed to create async runtime: {message}")]
    RuntimeCreationFailed {
        /// A description of the runtime failure.
        message: String,
    },
}

/// Failures of a single training attempt after the container was requested.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// The wall-clock budget for the attempt was exceeded.
    #[error("training timed out after {seconds} seconds")]
    Timeout {
        /// The configured timeout in seconds.
        seconds: u64,
    },

    /// Reading the container log stream failed.
    #[error("failed to read logs from container '{container_id}': {message}")]
    LogStream {
        /// The container whose logs were being read.
        container_id: String,
        /// A description of the read failure.
        message: String,
    },

    /// The workload ran to completion but reported failure.
    #[error("training failed with exit code {code}")]
    NonZeroExit {
        /// The exit status code reported by the engine.
        code: i64,
    },

    /// The engine could not report how the container finished.
    #[error("training outcome could not be observed: {message}")]
    CompletionUnobserved {
        /// A description of the wait failure.
        message: String,
    },

    /// The job was cancelled while the attempt was in progress.
    #[error("training cancelled")]
    Cancelled,
}

/// Errors reported by the bounded job queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// No slot became free within the enqueue timeout.
    #[error("job queue is full (capacity {capacity}), please try again later")]
    Full {
        /// The fixed capacity of the queue.
        capacity: usize,
    },

    /// The consuming side of the queue has been dropped.
    #[error("job queue is closed")]
    Closed,
}

/// Errors raised by job lookups and state transitions.
#[derive(Debug, Error)]
pub enum JobError {
    /// No job with the given identifier exists in the store.
    #[error("job not found: {id}")]
    NotFound {
        /// The identifier that was looked up.
        id: String,
    },

    /// The requested transition is not permitted from the current status.
    #[error("cannot move job '{id}' from {from} to {to}")]
    InvalidTransition {
        /// The job identifier.
        id: String,
        /// The current status.
        from: String,
        /// The requested status.
        to: String,
    },

    /// A status name could not be parsed.
    #[error("invalid status: {value}")]
    InvalidStatus {
        /// The unrecognised status text.
        value: String,
    },

    /// The worker loop could not be started.
    #[error("worker unavailable: {message}")]
    WorkerUnavailable {
        /// A description of why the worker cannot run.
        message: String,
    },
}

/// Errors that can occur during filesystem operations.
#[derive(Debug, Error)]
pub enum FilesystemError {
    /// An I/O error occurred.
    #[error("I/O error at '{path}': {message}")]
    IoError {
        /// The path where the error occurred.
        path: PathBuf,
        /// A description of the I/O error.
        message: String,
    },
}

/// Top-level error type for the trainbot application.
///
/// This enum aggregates all domain-specific errors into a single type that can
/// be used throughout the crate. At the application boundary (main.rs),
/// these errors are converted to `eyre::Report` for human-readable reporting.
#[derive(Debug, Error)]
pub enum TrainbotError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred during container engine operations.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// A training attempt failed.
    #[error(transparent)]
    Training(#[from] TrainingError),

    /// The job queue rejected an operation.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// A job lookup or transition failed.
    #[error(transparent)]
    Job(#[from] JobError),

    /// An error occurred during filesystem operations.
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

impl TrainbotError {
    /// Returns true when the error represents an exceeded time budget.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Training(TrainingError::Timeout { .. }))
    }

    /// Returns true when the error represents a user cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Training(TrainingError::Cancelled))
    }
}

/// A specialised `Result` type for trainbot operations.
pub type Result<T> = std::result::Result<T, TrainbotError>;
