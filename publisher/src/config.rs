//! Configuration management for the publisher.
//!
//! Loads configuration from TOML file with environment variable overrides.

use crate::utils::errors::{PublishError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Deploy server WebSocket URL, e.g. `ws://deploy.example.com:6000/ws`
    pub url: String,

    /// Shared secret sent in the connection header
    #[serde(default)]
    pub shared_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory holding one source tree per site, named by hostname
    pub root: PathBuf,

    /// Local files or directories whose name matches any of these globs are
    /// never published
    #[serde(default = "SourceConfig::default_exclude")]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// How long to wait for each server reply
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,
}

// Default values
fn default_log_level() -> String {
    "info".to_string()
}

fn default_reply_timeout_secs() -> u64 {
    120
}

impl SourceConfig {
    /// Version control metadata and Finder droppings
    pub fn default_exclude() -> Vec<String> {
        vec![".git".to_string(), ".DS_Store".to_string()]
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            reply_timeout_secs: default_reply_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| PublishError::Config(format!("{}: {}", path.display(), e)))?;

        if let Ok(secret) = std::env::var("DEPLOY_SHARED_SECRET") {
            config.server.shared_secret = secret;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.shared_secret.is_empty() {
            return Err(PublishError::Config(
                "server.shared_secret must be set (config file or DEPLOY_SHARED_SECRET)".to_string(),
            ));
        }
        if !self.server.url.starts_with("ws://") && !self.server.url.starts_with("wss://") {
            return Err(PublishError::Config(format!(
                "server.url must be a ws:// or wss:// URL, got {}",
                self.server.url
            )));
        }
        deploy_core::fs::exclude_set(&self.source.root, &self.source.exclude)?;
        Ok(())
    }

    /// Local source tree for a site
    pub fn site_source(&self, site: &str) -> PathBuf {
        self.source.root.join(site)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer.reply_timeout_secs)
    }
}
