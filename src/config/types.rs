//! Configuration data types for trainbot.

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Container parameters shared by every training job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Entrypoint argv; per-job training arguments are appended to it.
    pub command: Vec<String>,

    /// Memory limit such as `4g` or `512m`. Empty disables the limit.
    pub memory_limit: String,

    /// Number of CPUs granted to each container.
    pub cpu_count: u32,

    /// Engine network mode.
    pub network: String,

    /// Container runtime used when a job requests a GPU.
    pub gpu_runtime: String,

    /// Wall-clock budget in seconds for log streaming and for the exit wait.
    pub timeout_secs: u64,

    /// Pause in seconds between a failed attempt and the next one.
    pub retry_delay_secs: u64,

    /// Interval in milliseconds at which an idle log stream is re-checked.
    pub idle_poll_ms: u64,

    /// Host directory that receives per-attempt log files.
    pub log_dir: Utf8PathBuf,

    /// Mount point of `log_dir` inside the container.
    pub container_log_dir: String,

    /// Additional `KEY=value` environment entries.
    pub extra_env: Vec<String>,

    /// Trailing log lines captured after the container exits.
    pub tail_lines: u32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            command: vec![String::from("python"), String::from("train.py")],
            memory_limit: String::from("4g"),
            cpu_count: 2,
            network: String::from("bridge"),
            gpu_runtime: String::from("nvidia"),
            timeout_secs: 3600,
            retry_delay_secs: 5,
            idle_poll_ms: 1000,
            log_dir: Utf8PathBuf::from("./logs"),
            container_log_dir: String::from("/logs"),
            extra_env: Vec::new(),
            tail_lines: 100,
        }
    }
}

/// Bounded job queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of queued jobs.
    pub capacity: usize,

    /// Seconds a submission waits for a free slot before failing.
    pub enqueue_timeout_secs: u64,

    /// Milliseconds the worker waits on an empty queue before re-checking
    /// for shutdown.
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            enqueue_timeout_secs: 10,
            poll_interval_ms: 1000,
        }
    }
}

/// Background worker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Seconds `stop` waits for the worker before aborting it.
    pub shutdown_timeout_secs: u64,

    /// Milliseconds the worker pauses after an unexpected per-job error.
    pub error_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: 10,
            error_backoff_ms: 1000,
        }
    }
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `TRAINBOT_CONFIG_PATH` environment variable
/// 2. `.trainbot.toml` in the current working directory
/// 3. `.trainbot.toml` in the home directory
/// 4. `~/.config/trainbot/config.toml` (XDG default)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "TRAINBOT",
    post_merge_hook,
    discovery(
        app_name = "trainbot",
        env_var = "TRAINBOT_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".trainbot.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// The container engine socket path or URL.
    pub engine_socket: Option<String>,

    /// The container image used for training.
    pub image: Option<String>,

    /// Log filter directive, e.g. `info` or `trainbot=debug`.
    pub log_level: Option<String>,

    /// Training container configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub training: TrainingConfig,

    /// Job queue configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub queue: QueueConfig,

    /// Worker configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub worker: WorkerConfig,
}

impl AppConfig {
    /// Check values that cannot be expressed through types alone.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.training.command.is_empty(), "training.command", "must not be empty"),
            (self.training.cpu_count == 0, "training.cpu_count", "must be greater than zero"),
            (self.training.timeout_secs == 0, "training.timeout_secs", "must be greater than zero"),
            (self.training.idle_poll_ms == 0, "training.idle_poll_ms", "must be greater than zero"),
            (self.training.container_log_dir.is_empty(), "training.container_log_dir", "must not be empty"),
            (self.queue.capacity == 0, "queue.capacity", "must be greater than zero"),
            (self.queue.poll_interval_ms == 0, "queue.poll_interval_ms", "must be greater than zero"),
        ];

        if let Some((_, field, reason)) = checks.into_iter().find(|(failed, _, _)| *failed) {
            return Err(ConfigError::InvalidValue {
                field: String::from(field),
                reason: String::from(reason),
            }
            .into());
        }

        let memory_limit = self.training.memory_limit.trim();
        if !memory_limit.is_empty() {
            crate::job::config::parse_memory_limit(memory_limit)?;
        }

        if let Some(entry) = self
            .training
            .extra_env
            .iter()
            .find(|entry| !entry.contains('='))
        {
            return Err(ConfigError::InvalidValue {
                field: String::from("training.extra_env"),
                reason: format!("expected KEY=value, got '{entry}'"),
            }
            .into());
        }

        Ok(())
    }
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        // Blank strings from env or file layers mean "unset".
        for value in [&mut self.engine_socket, &mut self.image, &mut self.log_level] {
            if value.as_deref().is_some_and(|text| text.trim().is_empty()) {
                *value = None;
            }
        }
        Ok(())
    }
}
