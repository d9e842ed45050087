//! Integration tests for the `load_config()` public API.
//!
//! These tests drive `trainbot::config::load_config` from parsed CLI
//! arguments through to the final, validated configuration.


use std::io::Write;

use camino::Utf8PathBuf;
use clap::Parser;
use rstest::rstest;
use serial_test::serial;
use tempfile::NamedTempFile;
use test_utils::TrainbotEnv;
use trainbot::config::{Cli, Commands, load_config};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("trainbot").chain(args.iter().copied()))
        .expect("arguments should parse")
}

fn temp_config_file(content: &str) -> std::io::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(content.as_bytes())?;
    Ok(file)
}

fn utf8_path(file: &NamedTempFile) -> String {
    Utf8PathBuf::try_from(file.path().to_path_buf())
        .expect("path should be valid UTF-8")
        .into_string()
}

#[rstest]
#[serial]
fn defaults_apply_when_no_sources_are_given() {
    let _env = TrainbotEnv::isolated();

    let config = load_config(&parse(&["check"])).expect("defaults should load");

    assert!(config.engine_socket.is_none());
    assert!(config.image.is_none());
    assert_eq!(config.training.timeout_secs, 3600);
    assert_eq!(config.training.retry_delay_secs, 5);
    assert_eq!(config.training.memory_limit, "4g");
    assert_eq!(config.queue.capacity, 100);
    assert_eq!(config.worker.shutdown_timeout_secs, 10);
}

#[rstest]
#[serial]
fn config_file_values_are_loaded_and_nested_defaults_kept() {
    let _env = TrainbotEnv::isolated();
    let file = temp_config_file(
        r#"
        image = "registry.local/train:v2"

        [training]
        timeout_secs = 120
        memory_limit = "8g"

        [queue]
        capacity = 4
        "#,
    )
    .expect("temp config should be written");
    let path = utf8_path(&file);

    let config = load_config(&parse(&["--config", &path, "check"])).expect("config should load");

    assert_eq!(config.image.as_deref(), Some("registry.local/train:v2"));
    assert_eq!(config.training.timeout_secs, 120);
    assert_eq!(config.training.memory_limit, "8g");
    assert_eq!(config.queue.capacity, 4);
    assert_eq!(config.training.cpu_count, 2);
    assert_eq!(config.queue.poll_interval_ms, 1000);
}

#[rstest]
#[serial]
fn environment_overrides_file_and_cli_overrides_both() {
    let mut env = TrainbotEnv::isolated();
    let file = temp_config_file(
        r#"
        engine_socket = "unix:///from/file.sock"
        image = "file-image:v1"

        [training]
        timeout_secs = 120
        "#,
    )
    .expect("temp config should be written");
    let path = utf8_path(&file);
    env.set("TRAINBOT_ENGINE_SOCKET", "unix:///from/env.sock");
    env.set("TRAINBOT_TRAINING_TIMEOUT_SECS", "300");

    let cli = parse(&[
        "--config",
        &path,
        "--engine-socket",
        "unix:///from/cli.sock",
        "check",
    ]);
    let config = load_config(&cli).expect("config should load");

    assert_eq!(config.engine_socket.as_deref(), Some("unix:///from/cli.sock"));
    assert_eq!(config.image.as_deref(), Some("file-image:v1"));
    assert_eq!(config.training.timeout_secs, 300);
}

#[rstest]
#[serial]
fn list_environment_variables_are_split() {
    let mut env = TrainbotEnv::isolated();
    env.set("TRAINBOT_TRAINING_COMMAND", "python -m trainer.main");
    env.set("TRAINBOT_TRAINING_EXTRA_ENV", "WANDB_MODE=offline, SEED=7");

    let config = load_config(&parse(&["check"])).expect("config should load");

    assert_eq!(config.training.command, ["python", "-m", "trainer.main"]);
    assert_eq!(config.training.extra_env, ["WANDB_MODE=offline", "SEED=7"]);
}

#[rstest]
#[serial]
fn unparseable_numeric_environment_variable_is_rejected() {
    let mut env = TrainbotEnv::isolated();
    env.set("TRAINBOT_QUEUE_CAPACITY", "lots");

    let error = load_config(&parse(&["check"])).expect_err("invalid integer should fail");
    let message = error.to_string();

    assert!(message.contains("TRAINBOT_QUEUE_CAPACITY"), "{message}");
    assert!(message.contains("expected unsigned integer"), "{message}");
}

#[rstest]
#[serial]
fn missing_explicit_config_file_is_an_error() {
    let _env = TrainbotEnv::isolated();

    let error = load_config(&parse(&["--config", "/nonexistent/trainbot.toml", "check"]))
        .expect_err("missing file should fail");

    assert!(error.to_string().contains("/nonexistent/trainbot.toml"), "{error}");
}

#[rstest]
#[serial]
fn malformed_config_file_is_rejected() {
    let _env = TrainbotEnv::isolated();
    let file = temp_config_file("this is not valid TOML {{{").expect("temp config should be written");
    let path = utf8_path(&file);

    let result = load_config(&parse(&["--config", &path, "check"]));

    assert!(result.is_err(), "malformed TOML should fail");
}

#[rstest]
#[serial]
fn merged_values_are_validated() {
    let mut env = TrainbotEnv::isolated();
    env.set("TRAINBOT_QUEUE_CAPACITY", "0");

    let error = load_config(&parse(&["check"])).expect_err("zero capacity should fail");

    assert!(error.to_string().contains("queue.capacity"), "{error}");
}

#[rstest]
#[serial]
fn config_path_environment_variable_is_discovered() {
    let mut env = TrainbotEnv::isolated();
    let file = temp_config_file("image = \"discovered:latest\"\n")
        .expect("temp config should be written");
    let path = utf8_path(&file);
    env.set("TRAINBOT_CONFIG_PATH", &path);

    let config = load_config(&parse(&["check"])).expect("config should load");

    assert_eq!(config.image.as_deref(), Some("discovered:latest"));
}

#[rstest]
fn run_arguments_parse_into_a_job_spec() {
    let cli = parse(&["run", "--epochs", "2", "--batch-size", "16", "--max-retries", "1"]);
    let Commands::Run(args) = &cli.command else {
        panic!("expected the run subcommand");
    };

    let spec = trainbot::job::JobSpec::from(args);

    assert_eq!((spec.epochs, spec.batch_size, spec.max_retries), (2, 16, 1));
    assert!(!spec.gpu);
    assert!(spec.gpu_ids.is_none());
}
