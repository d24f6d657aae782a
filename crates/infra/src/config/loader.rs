//! Configuration loader
//!
//! [`load`] prefers environment variables and falls back to a JSON or TOML
//! file when `RENTLINE_API_URL` is not set.
//!
//! ## Environment Variables
//! - `RENTLINE_API_URL`: REST base URL (required)
//! - `RENTLINE_WS_URL`: WebSocket base URL
//! - `RENTLINE_API_TIMEOUT_MS`: Default request timeout in milliseconds
//! - `RENTLINE_HEALTH_ENABLED`: Whether the health gate is enabled (true/false)
//! - `RENTLINE_LOG_LEVEL`: Fallback tracing filter
//! - `RENTLINE_TOKEN_FILE`: Path of the durable token file
//!
//! Everything not provided keeps its default.
//!
//! ## File Locations
//! Searched in order:
//! 1. `./rentline.{json,toml}` or `./config.{json,toml}` (current working
//!    directory)
//! 2. The same names in the parent and grandparent directories
//! 3. Relative to executable location

use std::path::{Path, PathBuf};

use rentline_domain::{ApiError, Config, Result};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["rentline.json", "rentline.toml", "config.json", "config.toml"];

/// Environment first, then the first config file found.
///
/// # Errors
/// `ApiError::Config` when neither source yields a valid configuration.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Using configuration from environment");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Environment incomplete, looking for a config file");
            load_from_file(None)
        }
    }
}

/// Defaults overlaid with the `RENTLINE_*` variables.
///
/// # Errors
/// Returns `ApiError::Config` if `RENTLINE_API_URL` is missing or a
/// variable has an invalid value (including a zero timeout).
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();

    config.api.base_url = env_var("RENTLINE_API_URL")?;

    if let Some(timeout) = optional_env_var("RENTLINE_API_TIMEOUT_MS") {
        config.api.timeout_ms = timeout
            .parse::<u64>()
            .map_err(|e| ApiError::Config(format!("Invalid request timeout: {}", e)))?;
    }
    if let Some(ws_url) = optional_env_var("RENTLINE_WS_URL") {
        config.realtime.ws_base_url = ws_url;
    }
    config.health.enabled = env_bool("RENTLINE_HEALTH_ENABLED", config.health.enabled);
    if let Some(level) = optional_env_var("RENTLINE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(path) = optional_env_var("RENTLINE_TOKEN_FILE") {
        config.auth.token_file = Some(PathBuf::from(path));
    }

    config.validate()?;
    Ok(config)
}

/// Read `path`, or the first file [`find_config_paths`] finds.
///
/// # Errors
/// `ApiError::Config` when the file is missing, has an unsupported
/// extension, does not parse or holds unusable values.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ApiError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => find_config_paths().ok_or_else(|| {
            ApiError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Reading configuration file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| ApiError::Config(format!("Failed to read config file: {}", e)))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Extension picks the format; no extension means JSON.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ApiError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ApiError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(ApiError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// First existing config file below the working directory or the
/// executable's directory (each with two parent levels).
pub fn find_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.extend([exe_dir.to_path_buf(), exe_dir.join(".."), exe_dir.join("../..")]);
        }
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    optional_env_var(key)
        .ok_or_else(|| ApiError::Config(format!("Missing required environment variable: {}", key)))
}

/// Non-empty environment variable, if set
fn optional_env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// `1`, `true`, `yes` and `on` (any case) are true; anything else set is false.
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
