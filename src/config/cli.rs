//! Command-line argument definitions for trainbot.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

use crate::job::JobSpec;

/// Command-line interface for trainbot.
#[derive(Debug, Parser)]
#[command(name = "trainbot")]
#[command(
    author,
    version,
    about = "Run machine-learning training jobs in containers"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Container engine socket path or URL.
    #[arg(long, global = true)]
    pub engine_socket: Option<String>,

    /// Container image to use.
    #[arg(long, global = true)]
    pub image: Option<String>,

    /// Log filter directive, e.g. `debug`.
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Submit one training job and follow it to completion.
    Run(RunArgs),

    /// Verify that the container engine is reachable.
    Check,
}

/// Arguments for the `run` subcommand.
#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Number of training epochs.
    #[arg(long, default_value_t = 5)]
    pub epochs: u32,

    /// Training batch size.
    #[arg(long, default_value_t = 32)]
    pub batch_size: u32,

    /// Optimiser learning rate.
    #[arg(long, default_value_t = 0.001)]
    pub learning_rate: f64,

    /// Request a GPU runtime.
    #[arg(long)]
    pub gpu: bool,

    /// GPU device selector, e.g. `0,1`.
    #[arg(long)]
    pub gpu_ids: Option<String>,

    /// Additional attempts after the first failure.
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,
}

impl From<&RunArgs> for JobSpec {
    fn from(args: &RunArgs) -> Self {
        Self {
            epochs: args.epochs,
            batch_size: args.batch_size,
            learning_rate: args.learning_rate,
            gpu: args.gpu,
            gpu_ids: args.gpu_ids.clone(),
            max_retries: args.max_retries,
        }
    }
}
