//! Configuration schema definitions

use crate::utils::expand_home;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration for stream-chat
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Assistant service endpoint
    #[serde(default)]
    pub server: ServerConfig,
    /// Local persistence
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Assistant service endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host and port, without scheme
    #[serde(default = "default_server_host")]
    pub host: String,
    /// Well-known chat path on the host
    #[serde(default = "default_server_path")]
    pub path: String,
    /// Use `wss://` instead of `ws://`
    #[serde(default)]
    pub secure: bool,
}

fn default_server_host() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_server_path() -> String {
    "/ws/chat".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            path: default_server_path(),
            secure: false,
        }
    }
}

impl ServerConfig {
    /// Full WebSocket URL of the chat endpoint
    pub fn endpoint(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}{}", scheme, self.host, self.path)
    }

    /// Split a `ws://` or `wss://` URL into host, path and scheme
    pub fn from_url(url: &str) -> crate::Result<Self> {
        Self::parse_endpoint(url)
            .map_err(|e| crate::Error::Config(format!("invalid endpoint {:?}: {}", url, e)))
    }

    pub(crate) fn parse_endpoint(url: &str) -> Result<Self, String> {
        let (scheme, rest) = url
            .trim()
            .split_once("://")
            .ok_or("missing ws:// or wss:// scheme")?;
        let secure = match scheme.to_ascii_lowercase().as_str() {
            "ws" => false,
            "wss" => true,
            other => return Err(format!("unsupported scheme {}", other)),
        };
        let (host, path) = match rest.find('/') {
            Some(i) => rest.split_at(i),
            None => (rest, "/"),
        };
        if host.is_empty() {
            return Err("missing host".to_string());
        }
        Ok(Self {
            host: host.to_string(),
            path: path.to_string(),
            secure,
        })
    }
}

/// Local persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the persisted session id and message log
    #[serde(default = "default_storage_dir")]
    pub dir: String,
}

fn default_storage_dir() -> String {
    "~/.stream-chat/state".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

impl StorageConfig {
    /// Storage directory with `~` expanded
    pub fn dir_path(&self) -> PathBuf {
        expand_home(&self.dir)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "~/.stream-chat/logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}
