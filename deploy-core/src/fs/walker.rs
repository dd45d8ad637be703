//! Directory traversal producing file descriptors.
//!
//! Both sides walk a tree the same way: every regular file under the root
//! becomes a [`FileDescriptor`] whose path is relative to the root and
//! `/`-separated. Directories are not represented.

use crate::error::WalkError;
use crate::manifest::FileDescriptor;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Skip entries whose file name matches any of these globs. A plain
    /// name such as `.git` matches only that exact name.
    pub exclude_patterns: Vec<String>,
}

/// A file discovered during walking
#[derive(Debug, Clone)]
pub struct WalkedFile {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path, mtime and size
    pub descriptor: FileDescriptor,
}

/// Lazy walk over the regular files under a root.
///
/// Yields one item per file; the first error is yielded as `Err` and callers
/// are expected to stop there.
pub struct FileWalker {
    root: PathBuf,
    inner: walkdir::IntoIter,
    exclude: GlobSet,
    // Bad exclude pattern, reported as the first item
    pending: Option<WalkError>,
    failed: bool,
}

impl FileWalker {
    pub fn new(root: &Path, options: WalkOptions) -> Self {
        let inner = WalkDir::new(root)
            .follow_links(options.follow_links)
            .into_iter();

        let (exclude, pending) = match exclude_set(root, &options.exclude_patterns) {
            Ok(set) => (set, None),
            Err(e) => (GlobSet::empty(), Some(e)),
        };

        Self {
            root: root.to_path_buf(),
            inner,
            exclude,
            pending,
            failed: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn visit(&mut self, entry: DirEntry) -> Result<Option<WalkedFile>, WalkError> {
        if should_exclude(&entry, &self.exclude) {
            if entry.file_type().is_dir() {
                self.inner.skip_current_dir();
            }
            return Ok(None);
        }

        if entry.file_type().is_dir() {
            return Ok(None);
        }

        let io_err = |source| WalkError::Io {
            path: entry.path().to_path_buf(),
            source,
        };

        // Symlinks are resolved to their target; links to directories and
        // broken links are skipped.
        let metadata = if entry.path_is_symlink() {
            match std::fs::metadata(entry.path()) {
                Ok(resolved) if resolved.is_file() => resolved,
                Ok(_) => return Ok(None),
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(io_err(e)),
            }
        } else {
            let metadata = entry.metadata().map_err(|e| WalkError::from_walkdir(e, &self.root))?;
            if !metadata.is_file() {
                return Ok(None);
            }
            metadata
        };

        let relative = relative_path(entry.path(), &self.root)?;
        let mtime = mtime_millis(&metadata).map_err(io_err)?;

        Ok(Some(WalkedFile {
            path: entry.path().to_path_buf(),
            descriptor: FileDescriptor {
                path: relative,
                mtime,
                size: metadata.len(),
            },
        }))
    }
}

impl Iterator for FileWalker {
    type Item = Result<WalkedFile, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Some(e) = self.pending.take() {
            self.failed = true;
            return Some(Err(e));
        }

        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(WalkError::from_walkdir(e, &self.root))),
            };

            match self.visit(entry) {
                Ok(Some(file)) => return Some(Ok(file)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Walk a directory tree and collect all files, failing on the first error.
///
/// # Example
/// ```no_run
/// use deploy_core::fs::walker::{walk_files, WalkOptions};
/// use std::path::Path;
///
/// let files = walk_files(Path::new("/srv/sites/demo"), WalkOptions::default()).unwrap();
/// println!("Found {} files", files.len());
/// ```
pub fn walk_files(root: &Path, options: WalkOptions) -> Result<Vec<WalkedFile>, WalkError> {
    FileWalker::new(root, options).collect()
}

/// Modification time in milliseconds since the Unix epoch
pub fn mtime_millis(metadata: &Metadata) -> std::io::Result<i64> {
    let modified = metadata.modified()?;
    Ok(system_time_millis(modified))
}

pub fn system_time_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_millis() as i64,
        Err(before) => -(before.duration().as_millis() as i64),
    }
}

fn relative_path(path: &Path, root: &Path) -> Result<String, WalkError> {
    let relative = path.strip_prefix(root).unwrap_or(path);

    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            let part = part
                .to_str()
                .ok_or_else(|| WalkError::NonUtf8Path(path.to_path_buf()))?;
            parts.push(part);
        }
    }

    Ok(parts.join("/"))
}

/// Compile exclude patterns into one matcher
pub fn exclude_set(root: &Path, patterns: &[String]) -> Result<GlobSet, WalkError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| WalkError::Pattern {
            root: root.to_path_buf(),
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| WalkError::Pattern {
        root: root.to_path_buf(),
        pattern: patterns.join(", "),
        source,
    })
}

/// Excludes match on the entry's own name; the root is never excluded
fn should_exclude(entry: &DirEntry, exclude: &GlobSet) -> bool {
    entry.depth() > 0 && exclude.is_match(Path::new(entry.file_name()))
}
