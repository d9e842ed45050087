//! Container lifecycle operations behind a mockable seam.
//!
//! [`ContainerRuntime`] exposes exactly the engine calls a training attempt
//! needs. The `Docker` implementation forwards to `Bollard`; tests substitute
//! scripted fakes so controller logic runs without a daemon.

#[cfg(test)]
mod mock;
mod request;

use std::future::Future;
use std::pin::Pin;

use bollard::Docker;
use bollard::errors::Error as EngineError;
use bollard::models::{ContainerCreateBody, ContainerStateStatusEnum};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptionsBuilder, InspectContainerOptions,
    KillContainerOptions, LogsOptionsBuilder, RemoveContainerOptionsBuilder,
    StartContainerOptions, WaitContainerOptions,
};
use futures_util::{Stream, StreamExt, TryStreamExt, future};

#[cfg(test)]
pub(crate) use mock::MockRuntime;
pub use request::CreateContainerRequest;

/// HTTP status the engine uses for missing images and containers.
const NOT_FOUND: u16 = 404;

/// Boxed future returned by [`ContainerRuntime`] implementors.
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, EngineError>> + Send + 'a>>;

/// Boxed stream of raw log chunks returned by [`ContainerRuntime::follow_logs`].
pub type LogStream<'a> = Pin<Box<dyn Stream<Item = Result<Vec<u8>, EngineError>> + Send + 'a>>;

/// Coarse container state as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    /// Created but never started.
    Created,
    /// Running.
    Running,
    /// Paused.
    Paused,
    /// Restarting.
    Restarting,
    /// Being removed.
    Removing,
    /// Exited.
    Exited,
    /// Dead.
    Dead,
    /// The engine did not report a state.
    Unknown,
}

impl ContainerStatus {
    /// Returns true while the workload process is alive.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running | Self::Restarting)
    }
}

impl From<ContainerStateStatusEnum> for ContainerStatus {
    fn from(status: ContainerStateStatusEnum) -> Self {
        match status {
            ContainerStateStatusEnum::CREATED => Self::Created,
            ContainerStateStatusEnum::RUNNING => Self::Running,
            ContainerStateStatusEnum::PAUSED => Self::Paused,
            ContainerStateStatusEnum::RESTARTING => Self::Restarting,
            ContainerStateStatusEnum::REMOVING => Self::Removing,
            ContainerStateStatusEnum::EXITED => Self::Exited,
            ContainerStateStatusEnum::DEAD => Self::Dead,
            _ => Self::Unknown,
        }
    }
}

/// Container engine operations used to run one training attempt.
///
/// Returned futures borrow only the runtime, so implementors copy any
/// borrowed arguments they need.
pub trait ContainerRuntime: Send + Sync {
    /// Report whether `image` is present locally.
    fn image_exists(&self, image: &str) -> EngineFuture<'_, bool>;

    /// Pull `image` from its registry, completing when the pull finishes.
    fn pull_image(&self, image: &str) -> EngineFuture<'_, ()>;

    /// Create a container and return its identifier.
    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        body: ContainerCreateBody,
    ) -> EngineFuture<'_, String>;

    /// Start a created container.
    fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()>;

    /// Follow the combined stdout and stderr of a container.
    fn follow_logs(&self, container_id: &str) -> LogStream<'_>;

    /// Fetch the last `lines` lines of a container's output.
    fn tail_logs(&self, container_id: &str, lines: usize) -> EngineFuture<'_, String>;

    /// Inspect the current state of a container.
    fn container_status(&self, container_id: &str) -> EngineFuture<'_, ContainerStatus>;

    /// Block until the container exits, returning its exit code when the
    /// engine reports one.
    fn wait_container(&self, container_id: &str) -> EngineFuture<'_, Option<i64>>;

    /// Send SIGKILL to a container.
    fn kill_container(&self, container_id: &str) -> EngineFuture<'_, ()>;

    /// Force-remove a container.
    fn remove_container(&self, container_id: &str) -> EngineFuture<'_, ()>;
}

/// Returns true when the engine reported that the object does not exist.
#[must_use]
pub const fn is_not_found(error: &EngineError) -> bool {
    matches!(
        error,
        EngineError::DockerResponseServerError {
            status_code: NOT_FOUND,
            ..
        }
    )
}

impl ContainerRuntime for Docker {
    fn image_exists(&self, image: &str) -> EngineFuture<'_, bool> {
        let image = image.to_owned();
        Box::pin(async move {
            match self.inspect_image(&image).await {
                Ok(_) => Ok(true),
                Err(error) if is_not_found(&error) => Ok(false),
                Err(error) => Err(error),
            }
        })
    }

    fn pull_image(&self, image: &str) -> EngineFuture<'_, ()> {
        let options = CreateImageOptionsBuilder::new().from_image(image).build();
        Box::pin(async move {
            self.create_image(Some(options), None, None)
                .try_for_each(|_| future::ready(Ok(())))
                .await
        })
    }

    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        body: ContainerCreateBody,
    ) -> EngineFuture<'_, String> {
        Box::pin(async move {
            let response = Self::create_container(self, options, body).await?;
            Ok(response.id)
        })
    }

    fn start_container(&self, container_id: &str) -> EngineFuture<'_, ()> {
        let id = container_id.to_owned();
        Box::pin(async move {
            Self::start_container(self, &id, None::<StartContainerOptions>).await
        })
    }

    fn follow_logs(&self, container_id: &str) -> LogStream<'_> {
        let options = LogsOptionsBuilder::new()
            .follow(true)
            .stdout(true)
            .stderr(true)
            .build();
        Box::pin(
            self.logs(container_id, Some(options))
                .map_ok(|output| output.into_bytes().to_vec()),
        )
    }

    fn tail_logs(&self, container_id: &str, lines: usize) -> EngineFuture<'_, String> {
        let options = LogsOptionsBuilder::new()
            .follow(false)
            .stdout(true)
            .stderr(true)
            .tail(&lines.to_string())
            .build();
        let output = self.logs(container_id, Some(options));
        Box::pin(async move {
            let chunks: Vec<_> = output
                .map_ok(|chunk| chunk.into_bytes())
                .try_collect()
                .await?;
            Ok(chunks
                .iter()
                .map(|chunk| String::from_utf8_lossy(chunk))
                .collect())
        })
    }

    fn container_status(&self, container_id: &str) -> EngineFuture<'_, ContainerStatus> {
        let id = container_id.to_owned();
        Box::pin(async move {
            let details = self
                .inspect_container(&id, None::<InspectContainerOptions>)
                .await?;
            Ok(details
                .state
                .and_then(|state| state.status)
                .map_or(ContainerStatus::Unknown, ContainerStatus::from))
        })
    }

    fn wait_container(&self, container_id: &str) -> EngineFuture<'_, Option<i64>> {
        let id = container_id.to_owned();
        let mut responses =
            Box::pin(Self::wait_container(self, container_id, None::<WaitContainerOptions>));
        Box::pin(async move {
            match responses.next().await {
                Some(Ok(response)) => Ok(Some(response.status_code)),
                // Non-zero exits arrive as an error carrying the code.
                Some(Err(EngineError::DockerContainerWaitError { code, .. })) => Ok(Some(code)),
                Some(Err(error)) => Err(error),
                None => {
                    let details = self
                        .inspect_container(&id, None::<InspectContainerOptions>)
                        .await?;
                    Ok(details.state.and_then(|state| state.exit_code))
                }
            }
        })
    }

    fn kill_container(&self, container_id: &str) -> EngineFuture<'_, ()> {
        let id = container_id.to_owned();
        Box::pin(async move {
            Self::kill_container(self, &id, None::<KillContainerOptions>).await
        })
    }

    fn remove_container(&self, container_id: &str) -> EngineFuture<'_, ()> {
        let id = container_id.to_owned();
        let options = RemoveContainerOptionsBuilder::new().force(true).build();
        Box::pin(async move { Self::remove_container(self, &id, Some(options)).await })
    }
}
