//! Configuration loading for d2cc.
//!
//! Values come from, in increasing priority:
//! - built-in defaults
//! - a TOML file named by `D2CC_CONFIG`, else `config.toml` in the platform
//!   config directory
//! - `D2CC_*` environment variables

pub mod env;
pub mod source;

pub use env::{EnvError, EnvParser};
pub use source::{ConfigSource, Sourced};

use crate::errors::ErrorCode;
use crate::types::D2ccConfig;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "D2CC_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Read { .. } => ErrorCode::ConfigReadError,
            Self::Parse { .. } => ErrorCode::ConfigParseError,
        }
    }
}

/// A fully resolved configuration plus what went into it.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: D2ccConfig,
    /// File that was read, if any.
    pub path: Option<PathBuf>,
    /// Environment variables that overrode a value.
    pub overrides: Vec<String>,
    /// Rejected environment values; defaults were kept for these.
    pub env_errors: Vec<EnvError>,
}

/// `config.toml` under the platform config directory.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "d2cc").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load from `D2CC_CONFIG` or the default location, then apply the environment.
///
/// A missing default file is not an error; a missing `D2CC_CONFIG` file is.
pub fn load_config() -> Result<LoadedConfig, ConfigError> {
    if let Some(explicit) = std::env::var_os(CONFIG_ENV_VAR).filter(|p| !p.is_empty()) {
        return load_config_from(Path::new(&explicit));
    }
    match default_config_path() {
        Some(path) if path.is_file() => load_config_from(&path),
        _ => Ok(finish(D2ccConfig::default(), None)),
    }
}

/// Load a specific file, then apply the environment.
pub fn load_config_from(path: &Path) -> Result<LoadedConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: D2ccConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loaded config file");
    Ok(finish(config, Some(path.to_path_buf())))
}

fn finish(mut config: D2ccConfig, path: Option<PathBuf>) -> LoadedConfig {
    let mut parser = EnvParser::new();
    let overrides = apply_env_overrides(&mut config, &mut parser);
    LoadedConfig {
        config,
        path,
        overrides,
        env_errors: parser.take_errors(),
    }
}

/// Overlay `D2CC_*` variables onto `config`, returning the variables used.
pub fn apply_env_overrides(config: &mut D2ccConfig, parser: &mut EnvParser) -> Vec<String> {
    let mut used = Vec::new();
    let mut track = |sourced_var: Option<String>| {
        if let Some(var) = sourced_var {
            used.push(var);
        }
    };

    let general = &mut config.general;
    let v = parser.get_bool("ENABLED", general.enabled);
    general.enabled = v.value;
    track(v.env_var);
    let v = parser.get_log_level("LOG_LEVEL", &general.log_level);
    general.log_level = v.value;
    track(v.env_var);
    let v = parser.get_path("SOCKET", general.socket_path.clone());
    general.socket_path = v.value;
    track(v.env_var);

    let client = &mut config.client;
    let v = parser.get_u64_range("CONNECT_TIMEOUT_MS", client.connect_timeout_ms, 1, 60_000);
    client.connect_timeout_ms = v.value;
    track(v.env_var);
    let v = parser.get_u64_range("IO_TIMEOUT_MS", client.io_timeout_ms, 1, 600_000);
    client.io_timeout_ms = v.value;
    track(v.env_var);
    let v = parser.get_u64_range(
        "PREPROCESS_TIMEOUT_SECS",
        client.preprocess_timeout_secs,
        1,
        86_400,
    );
    client.preprocess_timeout_secs = v.value;
    track(v.env_var);
    let v = parser.get_bool("REQUIRE_OBJECT_ONLY", client.require_object_only);
    client.require_object_only = v.value;
    track(v.env_var);
    let v = parser.get_optional_path("COMPILER");
    if v.is_from_env() {
        client.compiler = v.value;
    }
    track(v.env_var);

    let daemon = &mut config.daemon;
    let v = parser.get_usize_range("MAX_CONNECTIONS", daemon.max_connections, 1, 65_536);
    daemon.max_connections = v.value;
    track(v.env_var);
    let v = parser.get_usize_range(
        "MAX_REQUEST_BYTES",
        daemon.max_request_bytes,
        1,
        usize::MAX,
    );
    daemon.max_request_bytes = v.value;
    track(v.env_var);

    used
}

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
