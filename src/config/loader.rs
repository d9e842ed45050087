//! Configuration loading with layered precedence.
//!
//! Precedence, lowest to highest: application defaults, configuration file,
//! environment variables, command-line arguments.
//!
//! Layers are composed with `MergeComposer` directly rather than through the
//! derived `load()` because the `Cli` struct owns subcommand dispatch, and
//! because typed environment values must fail fast instead of being ignored.
//!
//! # Environment Variable Handling
//!
//! Environment variables with unparseable values (e.g.
//! `TRAINBOT_TRAINING_TIMEOUT_SECS=soon`) return an error immediately. String
//! fields (e.g. `TRAINBOT_ENGINE_SOCKET`) are always accepted. List fields are
//! split on whitespace (`TRAINBOT_TRAINING_COMMAND`) or commas
//! (`TRAINBOT_TRAINING_EXTRA_ENV`).

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, Result};

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// String value (always accepted).
    String,
    /// Unsigned 64-bit integer. Invalid values return an error.
    U64,
    /// Whitespace-separated list of strings.
    Words,
    /// Comma-separated list of strings.
    CommaList,
}

/// Specification for a single environment variable mapping.
struct EnvVarSpec {
    /// The environment variable name (e.g., `TRAINBOT_ENGINE_SOCKET`).
    env_var: &'static str,
    /// The JSON path segments (e.g., `["training", "timeout_secs"]`).
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

const fn spec(
    env_var: &'static str,
    path: &'static [&'static str],
    var_type: EnvVarType,
) -> EnvVarSpec {
    EnvVarSpec {
        env_var,
        path,
        var_type,
    }
}

/// Table of all environment variables and their JSON paths.
const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    // Top-level fields
    spec("TRAINBOT_ENGINE_SOCKET", &["engine_socket"], EnvVarType::String),
    spec("TRAINBOT_IMAGE", &["image"], EnvVarType::String),
    spec("TRAINBOT_LOG_LEVEL", &["log_level"], EnvVarType::String),
    // Training fields
    spec("TRAINBOT_TRAINING_COMMAND", &["training", "command"], EnvVarType::Words),
    spec("TRAINBOT_TRAINING_MEMORY_LIMIT", &["training", "memory_limit"], EnvVarType::String),
    spec("TRAINBOT_TRAINING_CPU_COUNT", &["training", "cpu_count"], EnvVarType::U64),
    spec("TRAINBOT_TRAINING_NETWORK", &["training", "network"], EnvVarType::String),
    spec("TRAINBOT_TRAINING_GPU_RUNTIME", &["training", "gpu_runtime"], EnvVarType::String),
    spec("TRAINBOT_TRAINING_TIMEOUT_SECS", &["training", "timeout_secs"], EnvVarType::U64),
    spec("TRAINBOT_TRAINING_RETRY_DELAY_SECS", &["training", "retry_delay_secs"], EnvVarType::U64),
    spec("TRAINBOT_TRAINING_IDLE_POLL_MS", &["training", "idle_poll_ms"], EnvVarType::U64),
    spec("TRAINBOT_TRAINING_LOG_DIR", &["training", "log_dir"], EnvVarType::String),
    spec("TRAINBOT_TRAINING_CONTAINER_LOG_DIR", &["training", "container_log_dir"], EnvVarType::String),
    spec("TRAINBOT_TRAINING_EXTRA_ENV", &["training", "extra_env"], EnvVarType::CommaList),
    spec("TRAINBOT_TRAINING_TAIL_LINES", &["training", "tail_lines"], EnvVarType::U64),
    // Queue fields
    spec("TRAINBOT_QUEUE_CAPACITY", &["queue", "capacity"], EnvVarType::U64),
    spec("TRAINBOT_QUEUE_ENQUEUE_TIMEOUT_SECS", &["queue", "enqueue_timeout_secs"], EnvVarType::U64),
    spec("TRAINBOT_QUEUE_POLL_INTERVAL_MS", &["queue", "poll_interval_ms"], EnvVarType::U64),
    // Worker fields
    spec("TRAINBOT_WORKER_SHUTDOWN_TIMEOUT_SECS", &["worker", "shutdown_timeout_secs"], EnvVarType::U64),
    spec("TRAINBOT_WORKER_ERROR_BACKOFF_MS", &["worker", "error_backoff_ms"], EnvVarType::U64),
];

/// Returns the list of environment variable names recognised by the config loader.
///
/// Tests use this to clear every `TRAINBOT_*` variable without keeping a
/// second hard-coded list in sync.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|entry| entry.env_var).collect()
}

/// Load a configuration file and push it to the composer.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// Load configuration with full layer precedence, then validate it.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - an explicit `--config` path does not exist
/// - a configuration file is malformed
/// - a typed environment variable cannot be parsed
/// - the merged configuration fails [`AppConfig::validate`]
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    if let Some(path) = resolve_config_path(cli)? {
        load_config_file(&path, &mut composer)?;
    }

    let env_values = collect_env_vars()?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.validate()?;
    Ok(config)
}

fn resolve_config_path(cli: &Cli) -> Result<Option<Utf8PathBuf>> {
    if let Some(explicit) = &cli.config {
        if !explicit.exists() {
            return Err(ConfigError::FileNotFound {
                path: explicit.clone().into_std_path_buf(),
            }
            .into());
        }
        return Ok(Some(explicit.clone()));
    }

    let discovery = ConfigDiscovery::builder("trainbot")
        .env_var("TRAINBOT_CONFIG_PATH")
        .config_file_name("config.toml")
        .dotfile_name(".trainbot.toml")
        .build();
    Ok(discovery
        .candidates()
        .into_iter()
        .filter(|candidate| candidate.exists())
        .find_map(|candidate| Utf8PathBuf::try_from(candidate).ok()))
}

/// Collect `TRAINBOT_` environment variables into a JSON value.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if a numeric variable has an
/// unparseable value.
fn collect_env_vars() -> Result<Value> {
    let mut root = Map::new();

    for entry in ENV_VAR_SPECS {
        let Ok(raw_value) = std::env::var(entry.env_var) else {
            continue;
        };
        let json_value = parse_env_value(entry, raw_value)?;
        insert_at_path(&mut root, entry.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

fn parse_env_value(entry: &EnvVarSpec, raw_value: String) -> Result<Value> {
    let value = match entry.var_type {
        EnvVarType::String => Value::String(raw_value),
        EnvVarType::U64 => match raw_value.trim().parse::<u64>() {
            Ok(n) => Value::Number(n.into()),
            Err(_) => {
                return Err(ConfigError::InvalidValue {
                    field: entry.env_var.to_owned(),
                    reason: format!("expected unsigned integer, got '{raw_value}'"),
                }
                .into());
            }
        },
        EnvVarType::Words => Value::Array(
            raw_value
                .split_whitespace()
                .map(|word| Value::String(word.to_owned()))
                .collect(),
        ),
        EnvVarType::CommaList => Value::Array(
            raw_value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_owned()))
                .collect(),
        ),
    };
    Ok(value)
}

/// Insert a value at a nested path in a JSON map, creating intermediate
/// objects as needed.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    current.insert(field.to_owned(), value);
}

/// Build a JSON value containing CLI overrides.
fn build_cli_overrides(cli: &Cli) -> Value {
    let mut overrides = Map::new();

    let flags = [
        ("engine_socket", &cli.engine_socket),
        ("image", &cli.image),
        ("log_level", &cli.log_level),
    ];
    for (key, flag) in flags {
        if let Some(value) = flag {
            overrides.insert(key.to_owned(), Value::String(value.clone()));
        }
    }

    if overrides.is_empty() {
        Value::Null
    } else {
        Value::Object(overrides)
    }
}
