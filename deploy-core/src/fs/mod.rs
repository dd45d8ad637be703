//! Filesystem helpers.

pub mod walker;

pub use walker::{exclude_set, walk_files, FileWalker, WalkOptions, WalkedFile};
