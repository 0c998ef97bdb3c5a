//! Integration tests for the configuration layers: defaults, TOML file,
//! `IMAGEDUPS_*` environment variables and command-line flags.

use clap::Parser;
use imagedups::cli::Cli;
use imagedups::config::{Config, ENV_PREFIX};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::tempdir;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// Clear all IMAGEDUPS_* environment variables to avoid interference.
fn clear_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with(ENV_PREFIX) {
            std::env::remove_var(key);
        }
    }
}

#[test]
fn test_env_overrides_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    std::env::set_var("IMAGEDUPS_THRESHOLD", "85");
    std::env::set_var("IMAGEDUPS_ALGORITHM", "mean");

    let config: Config = Config::figment(None).extract().unwrap();
    assert_eq!(config.threshold, 85.0);
    assert_eq!(config.algorithm, "mean");
    assert_eq!(config.viewer, Config::default().viewer);

    clear_env();
}

#[test]
fn test_env_overrides_config_file() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        "algorithm = \"gradient\"\nthreshold = 70.0\njob_timeout_secs = 5\n",
    )
    .unwrap();
    std::env::set_var("IMAGEDUPS_THRESHOLD", "95");

    let config: Config = Config::figment(Some(&config_path)).extract().unwrap();
    assert_eq!(config.algorithm, "gradient");
    assert_eq!(config.threshold, 95.0);
    assert_eq!(config.job_timeout_secs, 5);

    clear_env();
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    let temp_dir = tempdir().unwrap();

    let config: Config = Config::figment(Some(&temp_dir.path().join("absent.toml")))
        .extract()
        .unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_invalid_env_value_is_an_error() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    std::env::set_var("IMAGEDUPS_THREADS", "many");

    let result: Result<Config, _> = Config::figment(None).extract();
    assert!(result.is_err());

    clear_env();
}

#[test]
fn test_cli_flags_win_over_environment() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();
    std::env::set_var("IMAGEDUPS_THRESHOLD", "60");
    std::env::set_var("IMAGEDUPS_VIEWER", "eog");

    let mut config: Config = Config::figment(None).extract().unwrap();
    let cli = Cli::parse_from([
        "imagedups",
        "-t",
        "88%",
        "-a",
        "blockhash",
        "--db",
        "/tmp/other.hashdb",
        "--threads",
        "2",
    ]);
    config.apply_cli(&cli);

    assert_eq!(config.threshold, 88.0);
    assert_eq!(config.algorithm, "blockhash");
    assert_eq!(config.database, PathBuf::from("/tmp/other.hashdb"));
    assert_eq!(config.threads, 2);
    assert_eq!(config.viewer, "eog");
    assert_eq!(config.hasher_config().threads, 2);

    clear_env();
}

#[test]
fn test_cli_without_flags_keeps_configuration() {
    let _lock = ENV_MUTEX.lock().unwrap();
    clear_env();

    let mut config = Config::default();
    config.apply_cli(&Cli::parse_from(["imagedups", "/pics"]));
    assert_eq!(config, Config::default());
}
