//! Container engine connection and container lifecycle operations.
//!
//! The engine endpoint is the first of these that is set and not blank:
//!
//! 1. `--engine-socket`, `engine_socket` in TOML, or `TRAINBOT_ENGINE_SOCKET`
//! 2. `DOCKER_HOST`, `CONTAINER_HOST`, then `PODMAN_HOST`
//! 3. Platform default (`/var/run/docker.sock` on Unix)

mod connection;
mod runtime;

pub use connection::{EndpointOrigin, EngineEndpoint, connect, open, ping};
#[cfg(test)]
pub(crate) use runtime::MockRuntime;
pub use runtime::{
    ContainerRuntime, ContainerStatus, CreateContainerRequest, EngineFuture, LogStream,
    is_not_found,
};
