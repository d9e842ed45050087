//! Structured logging setup.
//!
//! A `RUST_LOG` directive takes precedence; otherwise the configured level
//! (default `info`) applies to every target.

use tracing_subscriber::EnvFilter;

use crate::error::{ConfigError, Result};

/// Level used when neither `RUST_LOG` nor the configuration sets one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Build the filter from `RUST_LOG`, falling back to `level`.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` when `level` is not a valid directive.
pub fn filter(level: Option<&str>) -> Result<EnvFilter> {
    if let Ok(from_env) = EnvFilter::try_from_default_env() {
        return Ok(from_env);
    }
    let directive = level.unwrap_or(DEFAULT_LOG_LEVEL);
    EnvFilter::try_new(directive).map_err(|e| {
        ConfigError::InvalidValue {
            field: String::from("log_level"),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Install the global `fmt` subscriber.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` for an invalid level, or when a global
/// subscriber is already installed.
pub fn init(level: Option<&str>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level)?)
        .with_target(false)
        .try_init()
        .map_err(|e| {
            ConfigError::InvalidValue {
                field: String::from("log_level"),
                reason: e.to_string(),
            }
            .into()
        })
}
