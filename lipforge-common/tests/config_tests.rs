//! Tests for config file resolution
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate LIPFORGE_CONFIG are marked with #[serial].

use std::env;
use std::path::PathBuf;

use lipforge_common::config::{load_toml_config, resolve_toml_config, EngineToml, CONFIG_ENV_VAR};
use serial_test::serial;

fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("engine.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
#[serial]
fn explicit_path_wins_over_env() {
    let dir = tempfile::tempdir().unwrap();
    let explicit = write_config(&dir, "[server]\nport = 4001\n");

    let other = tempfile::tempdir().unwrap();
    let env_path = write_config(&other, "[server]\nport = 4002\n");
    env::set_var(CONFIG_ENV_VAR, &env_path);

    let config = resolve_toml_config(Some(&explicit)).unwrap();
    assert_eq!(config.server.port, Some(4001));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn env_path_used_without_explicit() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
        [workspace]
        scratch_root = "/var/tmp/lipforge"

        [compositor]
        crf_high = 16
        "#,
    );
    env::set_var(CONFIG_ENV_VAR, &path);

    let config = resolve_toml_config(None).unwrap();
    assert_eq!(
        config.workspace.scratch_root,
        Some(PathBuf::from("/var/tmp/lipforge"))
    );
    assert_eq!(config.compositor.crf_high, Some(16));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn missing_explicit_file_is_an_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    assert!(resolve_toml_config(Some(&missing)).is_err());
}

#[test]
fn malformed_file_reports_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[server\nport = ");

    let err = load_toml_config(&path).unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}

#[test]
fn empty_file_is_all_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "");

    assert_eq!(load_toml_config(&path).unwrap(), EngineToml::default());
}
