//! Configuration for the deploy server.
//!
//! Loaded from a TOML file, then overridden from the environment (a `.env`
//! file is honoured). The resulting [`AppConfig`] is immutable and shared as
//! `Arc<AppConfig>` with every component that needs it.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the HTTP/WebSocket listener binds to
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Secret the publisher must present in the connection header
    #[serde(default)]
    pub shared_secret: String,

    /// Root holding one content directory per site
    pub deployment_root: PathBuf,

    /// Root holding one reverse-proxy configuration file per site
    pub config_root: PathBuf,

    /// Contact address written into generated proxy configuration
    pub contact_email: String,

    /// Let `store` create a site's deployment directory on its own
    #[serde(default)]
    pub auto_create_sites: bool,

    /// Command run after a site's proxy configuration has been written
    #[serde(default)]
    pub reload: Option<ReloadCommand>,

    /// Upper bound on a manifest walk
    #[serde(default = "default_manifest_timeout_secs")]
    pub manifest_timeout_secs: u64,

    /// Upper bound on the reload command
    #[serde(default = "default_reload_timeout_secs")]
    pub reload_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadCommand {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 6000))
}

fn default_manifest_timeout_secs() -> u64 {
    60
}

fn default_reload_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file and apply environment overrides
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;

        let _ = dotenvy::dotenv();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("DEPLOY_SHARED_SECRET") {
            self.shared_secret = secret;
        }
        if let Some(listen) = std::env::var("DEPLOY_LISTEN")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.listen = listen;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.shared_secret.is_empty() {
            anyhow::bail!("shared_secret must be set (config file or DEPLOY_SHARED_SECRET)");
        }
        if let Some(reload) = &self.reload {
            if reload.command.trim().is_empty() {
                anyhow::bail!("reload.command must not be empty");
            }
        }
        Ok(())
    }

    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_secs(self.manifest_timeout_secs)
    }

    pub fn reload_timeout(&self) -> Duration {
        Duration::from_secs(self.reload_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            listen: default_listen(),
            shared_secret: String::new(),
            deployment_root: PathBuf::from("/srv/deploy/sites"),
            config_root: PathBuf::from("/etc/caddy/sites"),
            contact_email: "admin@localhost".to_string(),
            auto_create_sites: false,
            reload: None,
            manifest_timeout_secs: default_manifest_timeout_secs(),
            reload_timeout_secs: default_reload_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}
