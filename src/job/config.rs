//! Resolution of per-job container parameters.
//!
//! [`TrainingDefaults`] carries the process-wide settings derived once from
//! [`AppConfig`]; [`JobConfig::resolve`] combines them with a job's own
//! parameters into the immutable bag the controller owns for one job.

use std::time::Duration;

use camino::Utf8PathBuf;

use super::Job;
use crate::config::AppConfig;
use crate::error::{ConfigError, FilesystemError, Result, TrainbotError};

/// Image used when neither the CLI, environment, nor config file names one.
pub const DEFAULT_IMAGE: &str = "ai-training:latest";

const BYTES_PER_KIB: i64 = 1024;
const NANO_CPUS_PER_CPU: i64 = 1_000_000_000;

/// GPU runtime request attached to a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuRequest {
    /// Container runtime that exposes GPUs, e.g. `nvidia`.
    pub runtime: String,
    /// Comma-separated device ids. Exported as `CUDA_VISIBLE_DEVICES` and
    /// forwarded to the engine as a device request; `None` requests every GPU.
    pub device_ids: Option<String>,
}

/// Process-wide defaults applied to every job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingDefaults {
    /// Container image reference.
    pub image: String,
    /// Entrypoint argv; per-job arguments are appended.
    pub entrypoint: Vec<String>,
    /// Memory limit in bytes.
    pub memory_limit_bytes: Option<i64>,
    /// Number of CPUs granted to the container.
    pub cpu_count: u32,
    /// Engine network mode.
    pub network_mode: String,
    /// Runtime name used when a job requests a GPU.
    pub gpu_runtime: String,
    /// Wall-clock budget for streaming and for the completion wait.
    pub timeout: Duration,
    /// Pause between a failed attempt and the next one.
    pub retry_delay: Duration,
    /// Interval at which an idle log stream is re-checked.
    pub idle_poll: Duration,
    /// Host directory receiving log files and the workload's artifacts.
    pub log_dir: Utf8PathBuf,
    /// Mount point of `log_dir` inside the container.
    pub container_log_dir: String,
    /// Additional `KEY=value` environment entries.
    pub extra_env: Vec<String>,
    /// Number of trailing log lines captured after completion.
    pub tail_lines: usize,
}

impl TrainingDefaults {
    /// Derive defaults from the loaded application configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when the memory limit cannot be
    /// parsed.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let training = &config.training;
        let memory_limit_bytes = match training.memory_limit.trim() {
            "" => None,
            limit => Some(parse_memory_limit(limit)?),
        };

        Ok(Self {
            image: config
                .image
                .clone()
                .unwrap_or_else(|| String::from(DEFAULT_IMAGE)),
            entrypoint: training.command.clone(),
            memory_limit_bytes,
            cpu_count: training.cpu_count,
            network_mode: training.network.clone(),
            gpu_runtime: training.gpu_runtime.clone(),
            timeout: Duration::from_secs(training.timeout_secs),
            retry_delay: Duration::from_secs(training.retry_delay_secs),
            idle_poll: Duration::from_millis(training.idle_poll_ms),
            log_dir: training.log_dir.clone(),
            container_log_dir: training.container_log_dir.clone(),
            extra_env: training.extra_env.clone(),
            tail_lines: usize::try_from(training.tail_lines).unwrap_or(usize::MAX),
        })
    }
}

/// Resolved, immutable parameters for running one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    /// Container image reference.
    pub image: String,
    /// Full command argv.
    pub command: Vec<String>,
    /// Environment entries in `KEY=value` form.
    pub env: Vec<String>,
    /// Memory limit in bytes.
    pub memory_limit_bytes: Option<i64>,
    /// CPU quota in units of 10^-9 CPUs.
    pub nano_cpus: Option<i64>,
    /// Engine network mode.
    pub network_mode: String,
    /// GPU request, when the job asked for one.
    pub gpu: Option<GpuRequest>,
    /// Absolute host log directory.
    pub log_dir: Utf8PathBuf,
    /// Mount point of the log directory inside the container.
    pub container_log_dir: String,
    /// Wall-clock budget for streaming and for the completion wait.
    pub timeout: Duration,
    /// Additional attempts allowed after the first.
    pub max_retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Interval at which an idle log stream is re-checked.
    pub idle_poll: Duration,
    /// Trailing log lines captured after completion.
    pub tail_lines: usize,
}

impl JobConfig {
    /// Combine a job's parameters with process-wide defaults.
    ///
    /// # Errors
    ///
    /// Returns `FilesystemError::IoError` when the log directory cannot be
    /// made absolute.
    pub fn resolve(job: &Job, defaults: &TrainingDefaults) -> Result<Self> {
        let spec = job.spec();
        let mut command = defaults.entrypoint.clone();
        command.extend([
            String::from("--epochs"),
            spec.epochs.to_string(),
            String::from("--batch-size"),
            spec.batch_size.to_string(),
            String::from("--learning-rate"),
            spec.learning_rate.to_string(),
            String::from("--log-dir"),
            defaults.container_log_dir.clone(),
        ]);

        let visible_devices = spec
            .gpu
            .then(|| spec.gpu_ids.clone())
            .flatten()
            .unwrap_or_default();
        let mut env = vec![
            String::from("PYTHONUNBUFFERED=1"),
            format!("CUDA_VISIBLE_DEVICES={visible_devices}"),
        ];
        env.extend(defaults.extra_env.iter().cloned());

        let gpu = spec.gpu.then(|| GpuRequest {
            runtime: defaults.gpu_runtime.clone(),
            device_ids: spec.gpu_ids.clone(),
        });

        Ok(Self {
            image: defaults.image.clone(),
            command,
            env,
            memory_limit_bytes: defaults.memory_limit_bytes,
            nano_cpus: i64::from(defaults.cpu_count).checked_mul(NANO_CPUS_PER_CPU),
            network_mode: defaults.network_mode.clone(),
            gpu,
            log_dir: absolute_log_dir(&defaults.log_dir)?,
            container_log_dir: defaults.container_log_dir.clone(),
            timeout: defaults.timeout,
            max_retries: spec.max_retries,
            retry_delay: defaults.retry_delay,
            idle_poll: defaults.idle_poll,
            tail_lines: defaults.tail_lines,
        })
    }

    /// Volume binding that mounts the host log directory read-write.
    #[must_use]
    pub fn log_binding(&self) -> String {
        format!("{}:{}:rw", self.log_dir, self.container_log_dir)
    }
}

fn absolute_log_dir(log_dir: &Utf8PathBuf) -> Result<Utf8PathBuf> {
    if log_dir.is_absolute() {
        return Ok(log_dir.clone());
    }

    let io_error = |message: String| {
        TrainbotError::from(FilesystemError::IoError {
            path: log_dir.clone().into_std_path_buf(),
            message,
        })
    };
    let absolute =
        std::path::absolute(log_dir.as_std_path()).map_err(|e| io_error(e.to_string()))?;
    Utf8PathBuf::try_from(absolute).map_err(|e| io_error(e.to_string()))
}

/// Parse a memory limit such as `4g`, `512m`, `64k`, or a plain byte count.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` for empty, malformed, or overflowing
/// values.
pub fn parse_memory_limit(value: &str) -> Result<i64> {
    let invalid = |reason: &str| {
        TrainbotError::from(ConfigError::InvalidValue {
            field: String::from("training.memory_limit"),
            reason: format!("{reason}: '{value}'"),
        })
    };

    let trimmed = value.trim().to_ascii_lowercase();
    let (digits, multiplier) = match trimmed.char_indices().last() {
        Some((index, 'k')) => (trimmed.get(..index), BYTES_PER_KIB),
        Some((index, 'm')) => (trimmed.get(..index), BYTES_PER_KIB.pow(2)),
        Some((index, 'g')) => (trimmed.get(..index), BYTES_PER_KIB.pow(3)),
        Some((index, 'b')) => (trimmed.get(..index), 1),
        Some(_) => (Some(trimmed.as_str()), 1),
        None => return Err(invalid("memory limit is empty")),
    };

    let amount = digits
        .filter(|text| !text.is_empty())
        .and_then(|text| text.parse::<i64>().ok())
        .filter(|amount| *amount > 0)
        .ok_or_else(|| invalid("expected a positive size with optional k/m/g suffix"))?;

    amount
        .checked_mul(multiplier)
        .ok_or_else(|| invalid("memory limit overflows"))
}
