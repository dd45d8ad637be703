//! Mapping from site names and relative paths to locations on disk.
//!
//! Site content lives at `<deployment_root>/<site>/<path>` and the site's
//! proxy configuration at `<config_root>/<site>`. Both inputs come from the
//! network, so neither may escape its root.

use crate::config::AppConfig;
use crate::error::DeployError;
use std::path::{Component, Path, PathBuf};

const MAX_SITE_LEN: usize = 253;

/// Reject anything that is not a plain hostname-like name
pub fn validate_site(site: &str) -> Result<(), DeployError> {
    let valid = !site.is_empty()
        && site.len() <= MAX_SITE_LEN
        && !site.starts_with('.')
        && site
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));

    if valid {
        Ok(())
    } else {
        Err(DeployError::InvalidSite(site.to_string()))
    }
}

pub fn deployment_path(config: &AppConfig, site: &str) -> Result<PathBuf, DeployError> {
    validate_site(site)?;
    Ok(config.deployment_root.join(site))
}

pub fn site_config_path(config: &AppConfig, site: &str) -> Result<PathBuf, DeployError> {
    validate_site(site)?;
    Ok(config.config_root.join(site))
}

/// Join a publisher-supplied relative path onto a site directory
pub fn resolve_target(site_dir: &Path, relative: &str) -> Result<PathBuf, DeployError> {
    let invalid = || DeployError::InvalidPath(relative.to_string());

    if relative.is_empty() || relative.contains('\0') {
        return Err(invalid());
    }

    let mut target = site_dir.to_path_buf();
    let mut depth = 0;
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                target.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            _ => return Err(invalid()),
        }
    }

    if depth == 0 {
        return Err(invalid());
    }
    Ok(target)
}
