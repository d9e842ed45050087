//! Translation of resolved job parameters into container-create payloads.

use std::collections::HashMap;

use bollard::models::{ContainerCreateBody, DeviceRequest, HostConfig};
use bollard::query_parameters::{CreateContainerOptions, CreateContainerOptionsBuilder};

use crate::error::{ConfigError, TrainbotError};
use crate::job::JobId;
use crate::job::config::{GpuRequest, JobConfig};

const JOB_LABEL: &str = "trainbot.job_id";
const ATTEMPT_LABEL: &str = "trainbot.attempt";

/// Container-creation request for one attempt of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateContainerRequest {
    image: String,
    name: String,
    labels: HashMap<String, String>,
    cmd: Vec<String>,
    env: Vec<String>,
    binds: Vec<String>,
    memory: Option<i64>,
    nano_cpus: Option<i64>,
    network_mode: String,
    gpu: Option<GpuRequest>,
}

impl CreateContainerRequest {
    /// Build the request for attempt `attempt` (starting at zero) of `job_id`.
    ///
    /// The container is named `training_<short-id>_<attempt>`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when the image is empty or
    /// whitespace-only.
    pub fn for_attempt(
        job_id: &JobId,
        attempt: u32,
        config: &JobConfig,
    ) -> Result<Self, TrainbotError> {
        let image = validate_image(&config.image)?;
        let labels = HashMap::from([
            (String::from(JOB_LABEL), job_id.to_string()),
            (String::from(ATTEMPT_LABEL), attempt.to_string()),
        ]);

        Ok(Self {
            image: String::from(image),
            name: format!("training_{}_{attempt}", job_id.short()),
            labels,
            cmd: config.command.clone(),
            env: config.env.clone(),
            binds: vec![config.log_binding()],
            memory: config.memory_limit_bytes,
            nano_cpus: config.nano_cpus,
            network_mode: config.network_mode.clone(),
            gpu: config.gpu.clone(),
        })
    }

    /// Container name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Image reference.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Engine create options carrying the container name.
    #[must_use]
    pub fn options(&self) -> Option<CreateContainerOptions> {
        Some(CreateContainerOptionsBuilder::new().name(&self.name).build())
    }

    /// Engine create payload.
    #[must_use]
    pub fn body(&self) -> ContainerCreateBody {
        ContainerCreateBody {
            image: Some(self.image.clone()),
            cmd: Some(self.cmd.clone()),
            env: Some(self.env.clone()),
            labels: Some(self.labels.clone()),
            host_config: Some(self.host_config()),
            ..ContainerCreateBody::default()
        }
    }

    fn host_config(&self) -> HostConfig {
        HostConfig {
            binds: Some(self.binds.clone()),
            memory: self.memory,
            nano_cpus: self.nano_cpus,
            network_mode: Some(self.network_mode.clone()),
            runtime: self.gpu.as_ref().map(|gpu| gpu.runtime.clone()),
            device_requests: self.gpu.as_ref().map(|gpu| vec![device_request(gpu)]),
            // Containers are removed explicitly after logs are collected.
            auto_remove: Some(false),
            ..HostConfig::default()
        }
    }
}

/// Request every GPU, or only the listed ones when the job names devices.
fn device_request(gpu: &GpuRequest) -> DeviceRequest {
    let device_ids = gpu
        .device_ids
        .as_deref()
        .map(|ids| {
            ids.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(String::from)
                .collect::<Vec<_>>()
        })
        .filter(|ids| !ids.is_empty());

    DeviceRequest {
        count: device_ids.is_none().then_some(-1),
        device_ids,
        capabilities: Some(vec![vec![String::from("gpu")]]),
        ..DeviceRequest::default()
    }
}

fn validate_image(image: &str) -> Result<&str, TrainbotError> {
    let trimmed = image.trim();

    if trimmed.is_empty() {
        return Err(TrainbotError::from(ConfigError::MissingRequired {
            field: String::from("image"),
        }));
    }

    Ok(trimmed)
}
