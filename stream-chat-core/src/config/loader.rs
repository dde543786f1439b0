//! Configuration loading and management
//!
//! Layers, lowest first: built-in defaults, `config.json` in the config
//! directory, then `STREAM_CHAT_*` environment variables. The merged result
//! is validated before it is returned.

use super::schema::{Config, ServerConfig};
use super::validate::validate_config;
use crate::Error;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";

type Setter = fn(&mut Config, &str) -> Result<(), String>;

/// Environment overrides, applied in this order
const ENV_OVERRIDES: [(&str, Setter); 6] = [
    ("STREAM_CHAT_URL", set_url as Setter),
    ("STREAM_CHAT_HOST", set_host as Setter),
    ("STREAM_CHAT_SECURE", set_secure as Setter),
    ("STREAM_CHAT_STATE_DIR", set_state_dir as Setter),
    ("STREAM_CHAT_LOG_LEVEL", set_log_level as Setter),
    ("STREAM_CHAT_LOG_DIR", set_log_dir as Setter),
];

/// Configuration loader
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Create a new config loader with the default config directory
    pub fn new() -> Self {
        let config_dir = dirs::home_dir()
            .map(|h| h.join(".stream-chat"))
            .unwrap_or_else(|| PathBuf::from(".stream-chat"));

        Self { config_dir }
    }

    /// Create a new config loader with a custom config directory
    pub fn with_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            config_dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Load configuration from file and environment
    pub fn load(&self) -> crate::Result<Config> {
        let mut config = self.read_file()?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &Config) -> crate::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(self.config_path(), content)?;
        Ok(())
    }

    /// Path of the config file, whether or not it exists yet
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// A missing file means defaults; a malformed one is an error
    fn read_file(&self) -> crate::Result<Config> {
        let path = self.config_path();
        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply every override `lookup` has a non-empty value for
fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> crate::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    for (key, set) in ENV_OVERRIDES {
        let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        set(config, value.trim()).map_err(|e| Error::Config(format!("{}: {}", key, e)))?;
    }
    Ok(())
}

fn set_url(config: &mut Config, value: &str) -> Result<(), String> {
    config.server = ServerConfig::parse_endpoint(value)?;
    Ok(())
}

fn set_host(config: &mut Config, value: &str) -> Result<(), String> {
    config.server.host = value.to_string();
    Ok(())
}

fn set_secure(config: &mut Config, value: &str) -> Result<(), String> {
    config.server.secure = match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => true,
        "0" | "false" | "no" => false,
        _ => return Err(format!("expected true or false, got {:?}", value)),
    };
    Ok(())
}

fn set_state_dir(config: &mut Config, value: &str) -> Result<(), String> {
    config.storage.dir = value.to_string();
    Ok(())
}

fn set_log_level(config: &mut Config, value: &str) -> Result<(), String> {
    config.logging.level = value.to_ascii_lowercase();
    Ok(())
}

fn set_log_dir(config: &mut Config, value: &str) -> Result<(), String> {
    config.logging.dir = value.to_string();
    Ok(())
}
