//! Site provisioning: proxy configuration, deployment directory, reload.
//!
//! Order matters. The proxy configuration file and the deployment directory
//! must both be on disk before the reload command runs, because the reload
//! makes the proxy read them. Nothing is rolled back on failure; every step
//! overwrites, so provisioning can simply be retried.

use crate::config::{AppConfig, ReloadCommand};
use crate::error::DeployError;
use crate::paths;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

/// Inputs to proxy configuration generation
#[derive(Debug, Clone, Copy)]
pub struct SiteSpec<'a> {
    pub hostname: &'a str,
    pub deployment_path: &'a Path,
    pub contact_email: &'a str,
}

/// Renders the reverse-proxy configuration text for one site
pub trait ProxyConfigGenerator: Send + Sync {
    fn generate(&self, site: &SiteSpec<'_>) -> anyhow::Result<String>;
}

/// Caddyfile site block serving the deployment directory as static files
#[derive(Debug, Clone, Copy, Default)]
pub struct CaddyConfigGenerator;

impl ProxyConfigGenerator for CaddyConfigGenerator {
    fn generate(&self, site: &SiteSpec<'_>) -> anyhow::Result<String> {
        let root = site
            .deployment_path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("deployment path is not valid UTF-8"))?;

        Ok(format!(
            "# Generated by deploy-server at {generated}\n\
             {host} {{\n\
             \troot * {root}\n\
             \tfile_server\n\
             \ttls {email}\n\
             }}\n",
            generated = chrono::Utc::now().to_rfc3339(),
            host = site.hostname,
            root = root,
            email = site.contact_email,
        ))
    }
}

/// Provision `site`: write its proxy configuration, create its deployment
/// directory, then run the reload command if one is configured.
pub async fn create_site(
    config: &AppConfig,
    proxy: &dyn ProxyConfigGenerator,
    site: &str,
) -> Result<(), DeployError> {
    let deployment_path = paths::deployment_path(config, site)?;
    let config_path = paths::site_config_path(config, site)?;

    let text = proxy
        .generate(&SiteSpec {
            hostname: site,
            deployment_path: &deployment_path,
            contact_email: &config.contact_email,
        })
        .map_err(|e| DeployError::provision(site, format!("config generation failed: {e:#}")))?;

    let persist_site = site.to_string();
    tokio::task::spawn_blocking(move || -> Result<(), DeployError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DeployError::provision(&persist_site, format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        std::fs::write(&config_path, text).map_err(|e| {
            DeployError::provision(&persist_site, format!("failed to write {}: {e}", config_path.display()))
        })?;
        std::fs::create_dir_all(&deployment_path).map_err(|e| {
            DeployError::provision(
                &persist_site,
                format!("failed to create {}: {e}", deployment_path.display()),
            )
        })?;
        Ok(())
    })
    .await??;

    info!(site, "Site configuration written");

    if let Some(reload) = &config.reload {
        run_reload(reload, config.reload_timeout())
            .await
            .map_err(|reason| DeployError::provision(site, reason))?;
        info!(site, command = %reload.command, "Reload command succeeded");
    }

    Ok(())
}

/// Run the reload command, treating spawn failure, nonzero exit and timeout
/// alike as failure.
async fn run_reload(reload: &ReloadCommand, timeout: Duration) -> Result<(), String> {
    let child = Command::new(&reload.command)
        .args(&reload.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(format!("failed to run {}: {e}", reload.command)),
        Err(_) => return Err(format!("{} timed out after {:?}", reload.command, timeout)),
    };

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    warn!(command = %reload.command, status = %output.status, "Reload command failed");
    Err(format!(
        "{} exited with {}: {}",
        reload.command,
        output.status,
        stderr.trim()
    ))
}
