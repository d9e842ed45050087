//! Locating and reaching the container engine that runs training containers.
//!
//! [`EngineEndpoint::resolve`] decides where the engine listens. [`connect`]
//! opens a client there and pings it, so an unreachable engine is reported
//! before any job is accepted.

mod diagnosis;
mod endpoint;

use std::time::Duration;

use bollard::Docker;
use tracing::{debug, info};

use crate::error::{ContainerError, Result};
pub use endpoint::{EndpointOrigin, EngineEndpoint};

/// Request timeout of the engine client, in seconds.
const CLIENT_TIMEOUT_SECS: u64 = 120;

/// Budget for the ping sent after connecting.
const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Open a client for `endpoint` without contacting the engine.
///
/// # Errors
///
/// Returns `ContainerError::SocketNotFound` when a local socket does not
/// exist, and `ContainerError::ConnectionFailed` for any other client error.
pub fn open(endpoint: &EngineEndpoint) -> Result<Docker> {
    let address = endpoint.to_string();
    let opened = match endpoint {
        EngineEndpoint::Http(url) => {
            Docker::connect_with_http(url, CLIENT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
        }
        EngineEndpoint::Unix(_) | EngineEndpoint::NamedPipe(_) => Docker::connect_with_socket(
            &address,
            CLIENT_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        ),
    };
    let docker = opened.map_err(|e| diagnosis::connect_failure(&e, endpoint))?;
    debug!(endpoint = %address, "engine client opened");
    Ok(docker)
}

/// Confirm the engine behind `docker` answers a ping.
///
/// # Errors
///
/// Returns `ContainerError::HealthCheckTimeout` when no answer arrives in
/// time, the socket errors of [`open`] when the socket is the cause, and
/// `ContainerError::HealthCheckFailed` otherwise.
pub async fn ping(docker: &Docker, endpoint: &EngineEndpoint) -> Result<()> {
    let answered = tokio::time::timeout(PING_TIMEOUT, docker.ping())
        .await
        .map_err(|_elapsed| ContainerError::HealthCheckTimeout {
            seconds: PING_TIMEOUT.as_secs(),
        })?;
    answered.map_err(|e| diagnosis::ping_failure(&e, endpoint))?;
    Ok(())
}

/// Open a client for `endpoint` and ping it.
///
/// # Errors
///
/// See [`open`] and [`ping`].
pub async fn connect(endpoint: &EngineEndpoint) -> Result<Docker> {
    let docker = open(endpoint)?;
    ping(&docker, endpoint).await?;
    info!(endpoint = %endpoint, "container engine is responding");
    Ok(docker)
}
