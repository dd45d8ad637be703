//! Manifest building for a site's deployment directory.

use crate::error::DeployError;
use deploy_core::fs::{FileWalker, WalkOptions};
use deploy_core::{Manifest, WalkError};
use std::path::Path;
use tracing::debug;

/// Walk a site directory into a manifest.
///
/// Creates the directory first if it does not exist. All-or-nothing: the
/// first unreadable entry fails the whole walk and no manifest is returned.
/// Blocking; run it on the blocking pool.
pub fn build_manifest(site_dir: &Path) -> Result<Manifest, DeployError> {
    std::fs::create_dir_all(site_dir).map_err(|source| WalkError::Io {
        path: site_dir.to_path_buf(),
        source,
    })?;

    let mut manifest = Manifest::new();
    for file in FileWalker::new(site_dir, WalkOptions::default()) {
        manifest.insert(file?.descriptor)?;
    }

    debug!(
        "Built manifest for {}: {} files, {} bytes",
        site_dir.display(),
        manifest.len(),
        manifest.total_bytes()
    );
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_creates_missing_site_directory() {
        let temp_dir = TempDir::new().unwrap();
        let site_dir = temp_dir.path().join("new.example.com");

        let manifest = build_manifest(&site_dir).unwrap();

        assert!(manifest.is_empty());
        assert!(site_dir.is_dir());
    }

    #[test]
    fn test_existing_directory_is_not_an_error() {
        let temp_dir = TempDir::new().unwrap();
        build_manifest(temp_dir.path()).unwrap();
        build_manifest(temp_dir.path()).unwrap();
    }

    #[test]
    fn test_lists_files_not_directories() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("js/vendor")).unwrap();
        fs::create_dir_all(temp_dir.path().join("empty")).unwrap();
        fs::write(temp_dir.path().join("index.html"), vec![b'x'; 50]).unwrap();
        fs::write(temp_dir.path().join("js/vendor/lib.js"), b"var a;").unwrap();

        let manifest = build_manifest(temp_dir.path()).unwrap();

        let paths: Vec<&str> = manifest.paths().collect();
        assert_eq!(paths, vec!["index.html", "js/vendor/lib.js"]);
        assert_eq!(manifest.get("index.html").unwrap().size, 50);
    }

    #[test]
    #[cfg(unix)]
    fn test_unreadable_directory_fails_whole_walk() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let locked = temp_dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(temp_dir.path().join("index.html"), b"ok").unwrap();
        fs::write(locked.join("secret.txt"), b"hidden").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Permission bits do not stop root; nothing to assert in that case.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = build_manifest(temp_dir.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        match result {
            Err(DeployError::Walk(err)) => assert_eq!(err.path(), locked.as_path()),
            other => panic!("expected walk error, got {:?}", other),
        }
    }
}
