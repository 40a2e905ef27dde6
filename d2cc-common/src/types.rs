//! Configuration types shared by the wrapper and the daemon.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// d2cc configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct D2ccConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether the wrapper attempts remote compilation at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Log level (trace, debug, info, warn, error, off).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Path to the daemon's Unix socket.
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: default_log_level(),
            socket_path: default_socket_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Bound on each socket write.
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    /// Bound on the whole preprocessing phase.
    #[serde(default = "default_preprocess_timeout_secs")]
    pub preprocess_timeout_secs: u64,
    /// Only `-c` invocations go remote; link steps always run locally.
    #[serde(default = "default_true")]
    pub require_object_only: bool,
    /// Real compiler to run instead of searching PATH.
    #[serde(default)]
    pub compiler: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            io_timeout_ms: default_io_timeout_ms(),
            preprocess_timeout_secs: default_preprocess_timeout_secs(),
            require_object_only: true,
            compiler: None,
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn preprocess_timeout(&self) -> Duration {
        Duration::from_secs(self.preprocess_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Concurrent client connections served at once.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/d2cc.sock")
}

fn default_connect_timeout_ms() -> u64 {
    500
}

fn default_io_timeout_ms() -> u64 {
    5_000
}

fn default_preprocess_timeout_secs() -> u64 {
    300
}

fn default_max_connections() -> usize {
    64
}

fn default_max_request_bytes() -> usize {
    crate::session::DEFAULT_MAX_REQUEST_BYTES
}
