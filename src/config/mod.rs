//! Configuration system for trainbot.
//!
//! This module provides the configuration structures and CLI definitions for the
//! trainbot application. Configuration loading and precedence merging is handled by
//! the `ortho_config` crate. Precedence: CLI flags override environment
//! variables, which override configuration files, which override defaults.
//!
//! # Example Configuration
//!
//! ```toml
//! engine_socket = "unix:///var/run/docker.sock"
//! image = "registry.example.com/ml/train:2.1"
//! log_level = "info"
//!
//! [training]
//! command = ["python", "train.py"]
//! memory_limit = "8g"
//! cpu_count = 4
//! timeout_secs = 7200
//! log_dir = "/srv/trainbot/logs"
//!
//! [queue]
//! capacity = 50
//!
//! [worker]
//! shutdown_timeout_secs = 30
//! ```

mod cli;
mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use cli::{Cli, Commands, RunArgs};
pub use loader::{env_var_names, load_config};
pub use types::{AppConfig, QueueConfig, TrainingConfig, WorkerConfig};
