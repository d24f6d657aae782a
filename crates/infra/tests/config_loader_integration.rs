//! Integration tests for configuration loader
//!
//! Tests the end-to-end behavior of loading configuration from files.

use std::io::Write;

use rentline_domain::{ApiError, BackoffKind};
use rentline_infra::config;
use tempfile::NamedTempFile;

/// Write `contents` to a temp file carrying `extension`.
fn config_file(contents: &str, extension: &str) -> tempfile::TempPath {
    let mut temp_file = tempfile::Builder::new()
        .suffix(&format!(".{extension}"))
        .tempfile()
        .expect("Failed to create temp file");
    temp_file.write_all(contents.as_bytes()).expect("Failed to write to temp file");
    temp_file.into_temp_path()
}

#[test]
fn test_load_config_from_json_file() {
    let json_content = r#"{
        "api": {
            "base_url": "https://rent.example.com/api/v1",
            "timeout_ms": 12000,
            "default_headers": { "x-client": "desktop" }
        },
        "health": {
            "enabled": true,
            "check_interval_ms": 60000
        },
        "retry": {
            "retries": 4,
            "delay_ms": 250
        },
        "realtime": {
            "ws_base_url": "wss://rent.example.com",
            "max_reconnect_attempts": 8
        }
    }"#;

    let path = config_file(json_content, "json");
    let config = config::load_from_file(Some(path.to_path_buf())).expect("config from JSON");

    assert_eq!(config.api.base_url, "https://rent.example.com/api/v1");
    assert_eq!(config.api.timeout_ms, 12_000);
    assert_eq!(config.api.default_headers.get("x-client").map(String::as_str), Some("desktop"));
    assert_eq!(config.health.check_interval_ms, 60_000);
    assert_eq!(config.health.check_timeout_ms, 15_000);
    assert_eq!(config.retry.retries, 4);
    assert_eq!(config.retry.delay_ms, 250);
    assert_eq!(config.realtime.ws_base_url, "wss://rent.example.com");
    assert_eq!(config.realtime.max_reconnect_attempts, 8);
}

#[test]
fn test_load_config_from_toml_file() -> anyhow::Result<()> {
    let toml_content = r#"
[api]
base_url = "https://staging.rent.example.com/api/v1"

[health]
enabled = false

[retry]
strategy = "linear"

[auth]
refresh_path = "/auth/refresh/"
login_redirect_delay_ms = 500

[realtime]
should_reconnect = false
heartbeat_interval_ms = 10000

[logging]
level = "rentline_infra=debug"
json = true
"#;

    let path = config_file(toml_content, "toml");
    let config = config::load_from_file(Some(path.to_path_buf()))?;

    assert_eq!(config.api.base_url, "https://staging.rent.example.com/api/v1");
    assert!(!config.health.enabled);
    assert_eq!(config.retry.strategy, BackoffKind::Linear);
    assert_eq!(config.auth.refresh_path, "/auth/refresh/");
    assert_eq!(config.auth.login_redirect_delay_ms, 500);
    assert!(!config.realtime.should_reconnect);
    assert_eq!(config.realtime.heartbeat_interval_ms, 10_000);
    assert_eq!(config.logging.level, "rentline_infra=debug");
    assert!(config.logging.json);
    Ok(())
}

#[test]
fn test_load_config_with_minimal_fields() {
    let path = config_file(r#"{ "api": { "base_url": "http://10.0.0.5:8000/api/v1" } }"#, "json");
    let config = config::load_from_file(Some(path.to_path_buf())).expect("minimal config");

    assert_eq!(config.api.base_url, "http://10.0.0.5:8000/api/v1");
    assert_eq!(config.api.timeout_ms, 30_000);
    assert_eq!(config.retry.retries, 2);
    assert_eq!(config.auth.login_redirect_delay_ms, 1_500);
    assert_eq!(config.realtime.max_reconnect_attempts, 5);
    assert!(config.auth.token_file.is_none());
}

#[test]
fn test_load_config_from_nonexistent_file() {
    let result =
        config::load_from_file(Some("/nonexistent/path/to/rentline.json".into()));
    assert!(matches!(result, Err(ApiError::Config(_))), "Should fail for nonexistent file");
}

#[test]
fn test_load_config_with_invalid_format() {
    let path = config_file("{ this is not valid json }", "json");
    let result = config::load_from_file(Some(path.to_path_buf()));
    assert!(matches!(result, Err(ApiError::Config(_))), "Should fail for invalid JSON");

    let mut yaml = NamedTempFile::new().expect("Failed to create temp file");
    yaml.write_all(b"api: {}").expect("Failed to write to temp file");
    let yaml_path = yaml.path().with_extension("yaml");
    std::fs::copy(yaml.path(), &yaml_path).expect("Failed to copy file");

    let result = config::load_from_file(Some(yaml_path.clone()));
    assert!(matches!(result, Err(ApiError::Config(_))), "Should reject unknown extensions");

    std::fs::remove_file(yaml_path).ok();
}

#[test]
fn test_load_config_rejects_zero_intervals() {
    let path = config_file("[health]\ncheck_interval_ms = 0\n", "toml");
    let result = config::load_from_file(Some(path.to_path_buf()));
    assert!(
        matches!(&result, Err(ApiError::Config(message)) if message.contains("check_interval_ms")),
        "Zero health interval should be rejected: {result:?}"
    );

    let path = config_file(r#"{ "realtime": { "reconnect_factor": 0.0 } }"#, "json");
    let result = config::load_from_file(Some(path.to_path_buf()));
    assert!(matches!(result, Err(ApiError::Config(_))), "Zero reconnect factor should be rejected");

    let path = config_file(r#"{ "realtime": { "heartbeat_interval_ms": 0 } }"#, "json");
    let config = config::load_from_file(Some(path.to_path_buf())).expect("heartbeat off is valid");
    assert_eq!(config.realtime.heartbeat_interval_ms, 0);
}
