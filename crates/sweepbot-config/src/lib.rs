use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
}

/// Control API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    5000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Top-level sweepbot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepbotConfig {
    /// Control API server config.
    #[serde(default)]
    pub api: ApiConfig,
    /// Discord bot token. Usually supplied via the `DISCORD_TOKEN`
    /// environment variable rather than the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_token: Option<String>,
    /// Path of the JSON task file.
    #[serde(default = "default_tasks_file")]
    pub tasks_file: PathBuf,
}

fn default_tasks_file() -> PathBuf {
    PathBuf::from("conf").join("tasks.json")
}

impl Default for SweepbotConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            discord_token: None,
            tasks_file: default_tasks_file(),
        }
    }
}

/// Resolve the sweepbot config directory (~/.sweepbot/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".sweepbot"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.sweepbot/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<SweepbotConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path, falling back to defaults if not
/// found. The `DISCORD_TOKEN` environment variable overrides the file.
pub fn load_config_from(path: &Path) -> Result<SweepbotConfig, ConfigError> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        json5::from_str(&content)?
    } else {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        SweepbotConfig::default()
    };

    if let Ok(token) = std::env::var("DISCORD_TOKEN") {
        if !token.is_empty() {
            config.discord_token = Some(token);
        }
    }

    Ok(config)
}
