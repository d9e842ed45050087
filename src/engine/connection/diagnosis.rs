//! Mapping of engine client failures onto [`ContainerError`].
//!
//! A missing or unreadable local socket is reported with its path so the
//! operator can fix it; anything else keeps the client's own message.

use std::io;

use bollard::errors::Error as EngineError;

use super::EngineEndpoint;
use crate::error::ContainerError;

/// What went wrong reaching `endpoint`, when the cause is the socket itself.
pub(super) fn socket_fault(error: &EngineError, endpoint: &EngineEndpoint) -> Option<ContainerError> {
    let path = endpoint.local_path()?.as_std_path().to_path_buf();
    match io_kind(error)? {
        io::ErrorKind::NotFound => Some(ContainerError::SocketNotFound { path }),
        io::ErrorKind::PermissionDenied => Some(ContainerError::PermissionDenied { path }),
        _ => None,
    }
}

/// Failure to open a client for `endpoint`.
pub(super) fn connect_failure(error: &EngineError, endpoint: &EngineEndpoint) -> ContainerError {
    socket_fault(error, endpoint).unwrap_or_else(|| ContainerError::ConnectionFailed {
        message: format!("{endpoint}: {error}"),
    })
}

/// Failure of the ping sent to a freshly opened client.
pub(super) fn ping_failure(error: &EngineError, endpoint: &EngineEndpoint) -> ContainerError {
    socket_fault(error, endpoint).unwrap_or_else(|| ContainerError::HealthCheckFailed {
        message: error.to_string(),
    })
}

fn io_kind(error: &EngineError) -> Option<io::ErrorKind> {
    match error {
        EngineError::SocketNotFoundError(_) => Some(io::ErrorKind::NotFound),
        EngineError::IOError { err } => Some(nested_io_kind(err).unwrap_or_else(|| err.kind())),
        other => nested_io_kind(other),
    }
}

/// Kind of the first `io::Error` among the causes of `error`.
fn nested_io_kind(error: &dyn std::error::Error) -> Option<io::ErrorKind> {
    std::iter::successors(error.source(), |cause| cause.source())
        .find_map(|cause| cause.downcast_ref::<io::Error>())
        .map(io::Error::kind)
}
