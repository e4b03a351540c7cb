//! CLI integration tests.

use std::process::{Command, Output};

fn run_cli(args: &[&str], env: &[(&str, &str)]) -> std::io::Result<Output> {
    let mut command = Command::new(env!("CARGO_BIN_EXE_docsync"));
    command.args(args);
    for (key, _) in std::env::vars() {
        if key.starts_with("DOCSYNC_") {
            command.env_remove(key);
        }
    }
    command.env_remove("RUST_LOG");
    command.envs(env.iter().copied());
    command.output()
}

fn stdout_json(output: &Output) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::from_slice(&output.stdout)
}

#[test]
fn help_lists_commands() -> Result<(), Box<dyn std::error::Error>> {
    let output = run_cli(&["--help"], &[])?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["sync", "index", "secret", "config"] {
        assert!(stdout.contains(command), "missing {command} in help");
    }
    Ok(())
}

#[test]
fn config_show_prints_effective_config() -> Result<(), Box<dyn std::error::Error>> {
    let output = run_cli(
        &["--output", "json", "config", "show"],
        &[("DOCSYNC_SYNC_CHUNK_SIZE", "25")],
    )?;
    assert_eq!(output.status.code(), Some(0));
    let value = stdout_json(&output)?;
    assert_eq!(value.pointer("/status"), Some(&serde_json::json!("ok")));
    assert_eq!(
        value.pointer("/effectiveConfig/sync/chunkSize"),
        Some(&serde_json::json!(25))
    );
    Ok(())
}

#[test]
fn config_show_renders_toml() -> Result<(), Box<dyn std::error::Error>> {
    let output = run_cli(&["config", "show", "--format", "toml"], &[])?;
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[elasticsearch]"));
    assert!(stdout.contains("chunkSize = 500"));
    Ok(())
}

#[test]
fn config_file_is_merged_under_env() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("docsync.toml");
    std::fs::write(&path, "[sync]\nchunkSize = 40\ndisplayEvery = 7\n")?;
    let path = path.to_string_lossy().into_owned();

    let output = run_cli(
        &["--output", "json", "--config", &path, "config", "show"],
        &[("DOCSYNC_SYNC_CHUNK_SIZE", "12")],
    )?;
    assert_eq!(output.status.code(), Some(0));
    let value = stdout_json(&output)?;
    assert_eq!(value.pointer("/effectiveConfig/sync/chunkSize"), Some(&serde_json::json!(12)));
    assert_eq!(value.pointer("/effectiveConfig/sync/displayEvery"), Some(&serde_json::json!(7)));
    Ok(())
}

#[test]
fn missing_config_file_is_an_io_error() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("absent.toml").to_string_lossy().into_owned();
    let output = run_cli(&["--config", &path, "config", "show"], &[])?;
    assert_eq!(output.status.code(), Some(3));
    Ok(())
}

#[test]
fn invalid_log_level_is_invalid_input() -> Result<(), Box<dyn std::error::Error>> {
    let output = run_cli(
        &["--output", "json", "config", "show"],
        &[("DOCSYNC_LOG_LEVEL", "chatty")],
    )?;
    assert_eq!(output.status.code(), Some(2));
    let value = stdout_json(&output)?;
    assert_eq!(value.pointer("/status"), Some(&serde_json::json!("error")));
    Ok(())
}

#[test]
fn config_check_flags_missing_credentials() -> Result<(), Box<dyn std::error::Error>> {
    let output = run_cli(&["--output", "json", "config", "check"], &[])?;
    assert_eq!(output.status.code(), Some(2));
    let value = stdout_json(&output)?;
    assert_eq!(value.pointer("/checks/0/name"), Some(&serde_json::json!("credentials")));
    assert_eq!(value.pointer("/checks/0/ok"), Some(&serde_json::json!(false)));
    Ok(())
}

#[test]
fn sync_without_credentials_fails_before_connecting() -> Result<(), Box<dyn std::error::Error>> {
    let output = run_cli(
        &["--output", "json", "sync", "--index", "search-docs", "--service-type", "fake"],
        &[],
    )?;
    assert_eq!(output.status.code(), Some(2));
    let value = stdout_json(&output)?;
    assert_eq!(
        value.pointer("/error/code"),
        Some(&serde_json::json!("config:invalid_credentials"))
    );
    assert_eq!(
        value.pointer("/error/message"),
        Some(&serde_json::json!("Invalid Elasticsearch credentials"))
    );
    Ok(())
}

#[test]
fn unknown_service_type_is_invalid_input() -> Result<(), Box<dyn std::error::Error>> {
    let output = run_cli(
        &["--output", "json", "sync", "--index", "search-docs", "--service-type", "gdrive"],
        &[("DOCSYNC_ES_API_KEY", "encoded-key")],
    )?;
    assert_eq!(output.status.code(), Some(2));
    let value = stdout_json(&output)?;
    assert_eq!(
        value.pointer("/error/code"),
        Some(&serde_json::json!("config:unknown_service_type"))
    );
    Ok(())
}

#[test]
fn unreachable_cluster_is_an_internal_error() -> Result<(), Box<dyn std::error::Error>> {
    let output = run_cli(
        &["--output", "json", "sync", "--index", "search-docs", "--service-type", "fake"],
        &[
            ("DOCSYNC_ES_API_KEY", "encoded-key"),
            ("DOCSYNC_ES_HOST", "http://127.0.0.1:9"),
            ("DOCSYNC_RETRY_MAX_ATTEMPTS", "1"),
        ],
    )?;
    assert_eq!(output.status.code(), Some(1));
    Ok(())
}

#[test]
fn destructive_commands_require_confirmation() -> Result<(), Box<dyn std::error::Error>> {
    let clean = run_cli(&["index", "clean", "search-docs"], &[])?;
    assert_eq!(clean.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&clean.stdout).contains("--yes"));

    let delete = run_cli(&["index", "delete", "search-a", "search-b"], &[])?;
    assert_eq!(delete.status.code(), Some(2));
    Ok(())
}
