//! Shared fixtures and helper functions for config tests.

use std::sync::Arc;

use ortho_config::MergeComposer;
use rstest::fixture;

use crate::config::AppConfig;

/// Fixture providing an `AppConfig` parsed from a full TOML example.
#[fixture]
pub fn app_config_from_full_toml() -> AppConfig {
    let toml = r#"
        engine_socket = "unix:///run/docker.sock"
        image = "registry.example.com/ml/train:2.1"
        log_level = "debug"

        [training]
        command = ["python", "-m", "trainer"]
        memory_limit = "8g"
        cpu_count = 4
        network = "host"
        gpu_runtime = "nvidia"
        timeout_secs = 7200
        retry_delay_secs = 1
        log_dir = "/srv/trainbot/logs"
        container_log_dir = "/artifacts"
        extra_env = ["WANDB_MODE=offline"]
        tail_lines = 20

        [queue]
        capacity = 8
        enqueue_timeout_secs = 2
        poll_interval_ms = 250

        [worker]
        shutdown_timeout_secs = 30
        error_backoff_ms = 50
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Fixture providing an `AppConfig` parsed from a minimal TOML example.
#[fixture]
pub fn app_config_from_partial_toml() -> AppConfig {
    let toml = r#"
        image = "custom:1"

        [training]
        cpu_count = 8
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
pub fn create_composer_with_defaults() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = MergeComposer::new();
    let defaults = ortho_config::serde_json::to_value(AppConfig::default())?;
    composer.push_defaults(defaults);
    Ok(composer)
}

/// Helper: Merges layers from a composer into `AppConfig`.
pub fn merge_config(composer: MergeComposer) -> Result<AppConfig, Arc<ortho_config::OrthoError>> {
    AppConfig::merge_from_layers(composer.layers())
}

/// Helper: Asserts that a config has all default values.
pub fn assert_config_has_defaults(config: &AppConfig) {
    assert!(config.engine_socket.is_none(), "engine_socket should be None");
    assert!(config.image.is_none(), "image should be None");
    assert_eq!(config.training.command, vec!["python", "train.py"]);
    assert_eq!(config.training.memory_limit, "4g");
    assert_eq!(config.training.cpu_count, 2);
    assert_eq!(config.training.timeout_secs, 3600);
    assert_eq!(config.training.retry_delay_secs, 5);
    assert_eq!(config.training.log_dir.as_str(), "./logs");
    assert_eq!(config.training.container_log_dir, "/logs");
    assert_eq!(config.queue.capacity, 100);
    assert_eq!(config.queue.enqueue_timeout_secs, 10);
    assert_eq!(config.worker.shutdown_timeout_secs, 10);
}
