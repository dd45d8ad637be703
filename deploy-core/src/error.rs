//! Error types shared by both sides of the connection.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure while walking a directory tree.
///
/// Always carries the path that could not be read so the caller can report
/// it back to the requester.
#[derive(Error, Debug)]
pub enum WalkError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    #[error("invalid exclude pattern {pattern:?}: {source}")]
    Pattern {
        root: PathBuf,
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

impl WalkError {
    /// Path the walk failed at
    pub fn path(&self) -> &Path {
        match self {
            WalkError::Io { path, .. } => path,
            WalkError::NonUtf8Path(path) => path,
            WalkError::Pattern { root, .. } => root,
        }
    }

    pub(crate) fn from_walkdir(err: walkdir::Error, root: &Path) -> Self {
        let path = err.path().unwrap_or(root).to_path_buf();
        let source = err
            .into_io_error()
            .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
        WalkError::Io { path, source }
    }
}

/// A manifest violated its one-entry-per-path invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("duplicate manifest entry for {0}")]
    DuplicatePath(String),
}
