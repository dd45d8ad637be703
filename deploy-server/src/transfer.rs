//! Applying store and delete operations to a site's deployment directory.
//!
//! Both functions are blocking and expect the caller to hold the site's lock.
//!
//! The publisher only knows about files, so the server keeps its tree shaped
//! to match: a store replaces whatever stands in its way (a directory at the
//! target, a file where a parent directory belongs) and a delete prunes the
//! directories it leaves empty.

use crate::error::DeployError;
use crate::paths;
use filetime::FileTime;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;

/// Write `content` to `relative` under `site_dir`, overwriting.
///
/// The site directory itself must already exist unless `auto_create` is set.
/// Parent directories inside the site are created on every call before the
/// write starts. A directory at the target path, or a file standing where a
/// parent directory belongs, is removed first. When `mtime` (epoch ms) is given it is stamped on the file so
/// the next manifest reports the publisher's fingerprint.
///
/// Returns the number of bytes written.
pub fn store(
    site: &str,
    site_dir: &Path,
    relative: &str,
    content: &[u8],
    mtime: Option<i64>,
    auto_create: bool,
) -> Result<u64, DeployError> {
    let target = paths::resolve_target(site_dir, relative)?;

    if !site_dir.is_dir() {
        if !auto_create {
            return Err(DeployError::SiteNotProvisioned(site.to_string()));
        }
        fs::create_dir_all(site_dir).map_err(|source| DeployError::Write {
            path: site_dir.to_path_buf(),
            source,
        })?;
    }

    let write_err = |source| DeployError::Write {
        path: target.clone(),
        source,
    };

    clear_way(site_dir, &target).map_err(write_err)?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(&target, content).map_err(write_err)?;

    if let Some(mtime) = mtime {
        filetime::set_file_mtime(&target, filetime_from_millis(mtime)).map_err(write_err)?;
    }

    Ok(content.len() as u64)
}

/// Remove `relative` under `site_dir`.
///
/// A file that is already gone counts as success, and so does a path that is
/// now a directory or sits below a file; the return value tells whether
/// anything was actually removed. Directories emptied by the removal are
/// pruned up to, but not including, `site_dir`.
pub fn delete(
    site: &str,
    site_dir: &Path,
    relative: &str,
    auto_create: bool,
) -> Result<bool, DeployError> {
    let target = paths::resolve_target(site_dir, relative)?;

    if !site_dir.is_dir() {
        return if auto_create {
            Ok(false)
        } else {
            Err(DeployError::SiteNotProvisioned(site.to_string()))
        };
    }

    let unlink_err = |source| DeployError::Unlink {
        path: target.clone(),
        source,
    };

    match fs::symlink_metadata(&target) {
        Ok(metadata) if metadata.is_dir() => return Ok(false),
        Ok(_) => {}
        Err(e) if is_absent(&e) => return Ok(false),
        Err(e) => return Err(unlink_err(e)),
    }

    match fs::remove_file(&target) {
        Ok(()) => {}
        Err(e) if is_absent(&e) => return Ok(false),
        Err(e) => return Err(unlink_err(e)),
    }

    prune_empty_parents(site_dir, &target);
    Ok(true)
}

/// Remove what would stop `target` from being written as a regular file
fn clear_way(site_dir: &Path, target: &Path) -> io::Result<()> {
    let Ok(relative) = target.strip_prefix(site_dir) else {
        return Ok(());
    };

    let mut current = site_dir.to_path_buf();
    let mut components = relative.components().peekable();
    while let Some(component) = components.next() {
        current.push(component);
        let metadata = match fs::symlink_metadata(&current) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        if components.peek().is_none() {
            if metadata.is_dir() {
                fs::remove_dir_all(&current)?;
            }
        } else if !metadata.is_dir() {
            // Everything below a file is missing by definition
            fs::remove_file(&current)?;
            return Ok(());
        }
    }

    Ok(())
}

fn prune_empty_parents(site_dir: &Path, target: &Path) {
    let mut dir = target.parent();
    while let Some(current) = dir {
        if current == site_dir || !current.starts_with(site_dir) {
            break;
        }
        // Fails on the first non-empty directory
        if fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}

fn is_absent(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

fn filetime_from_millis(millis: i64) -> FileTime {
    let seconds = millis.div_euclid(1000);
    let nanos = (millis.rem_euclid(1000) * 1_000_000) as u32;
    FileTime::from_unix_time(seconds, nanos)
}
