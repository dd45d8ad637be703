//! Manifest types describing a site's deployed file tree.
//!
//! A manifest records every file under a site root with its size and mtime.
//! The (mtime, size) pair is the only change fingerprint: two files that agree
//! on both are considered identical even if their content differs.

use crate::error::ManifestError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Snapshot of one file at walk time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Path relative to the site root, `/`-separated
    pub path: String,

    /// Last modified time (milliseconds since Unix epoch)
    pub mtime: i64,

    /// File size in bytes
    pub size: u64,
}

impl FileDescriptor {
    /// True when both descriptors carry the same (mtime, size) fingerprint.
    pub fn same_fingerprint(&self, other: &FileDescriptor) -> bool {
        self.mtime == other.mtime && self.size == other.size
    }
}

/// Set of file descriptors keyed by relative path.
///
/// Serialized as a plain JSON list; deserializing a list that names the same
/// path twice is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FileDescriptor>", into = "Vec<FileDescriptor>")]
pub struct Manifest {
    entries: BTreeMap<String, FileDescriptor>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manifest, failing on the first duplicate path.
    pub fn from_descriptors<I>(descriptors: I) -> Result<Self, ManifestError>
    where
        I: IntoIterator<Item = FileDescriptor>,
    {
        let mut manifest = Self::new();
        for descriptor in descriptors {
            manifest.insert(descriptor)?;
        }
        Ok(manifest)
    }

    pub fn insert(&mut self, descriptor: FileDescriptor) -> Result<(), ManifestError> {
        if self.entries.contains_key(&descriptor.path) {
            return Err(ManifestError::DuplicatePath(descriptor.path));
        }
        self.entries.insert(descriptor.path.clone(), descriptor);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&FileDescriptor> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptors in path order
    pub fn iter(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.entries.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.values().map(|d| d.size).sum()
    }

    /// Consume into a hash lookup for O(1) membership tests while diffing.
    pub fn into_lookup(self) -> HashMap<String, FileDescriptor> {
        self.entries.into_iter().collect()
    }
}

impl TryFrom<Vec<FileDescriptor>> for Manifest {
    type Error = ManifestError;

    fn try_from(descriptors: Vec<FileDescriptor>) -> Result<Self, Self::Error> {
        Manifest::from_descriptors(descriptors)
    }
}

impl From<Manifest> for Vec<FileDescriptor> {
    fn from(manifest: Manifest) -> Self {
        manifest.entries.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(path: &str, mtime: i64, size: u64) -> FileDescriptor {
        FileDescriptor {
            path: path.to_string(),
            mtime,
            size,
        }
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let result = Manifest::from_descriptors(vec![
            descriptor("index.html", 1000, 50),
            descriptor("index.html", 2000, 60),
        ]);

        assert_eq!(
            result,
            Err(ManifestError::DuplicatePath("index.html".to_string()))
        );
    }

    #[test]
    fn test_manifest_serializes_as_list() {
        let manifest = Manifest::from_descriptors(vec![
            descriptor("b.css", 2, 20),
            descriptor("a.html", 1, 10),
        ])
        .unwrap();

        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"path": "a.html", "mtime": 1, "size": 10},
                {"path": "b.css", "mtime": 2, "size": 20},
            ])
        );
    }

    #[test]
    fn test_deserialize_rejects_duplicates() {
        let json = r#"[{"path":"a","mtime":1,"size":1},{"path":"a","mtime":1,"size":1}]"#;
        let err = serde_json::from_str::<Manifest>(json).unwrap_err();
        assert!(err.to_string().contains("duplicate manifest entry for a"));
    }

    #[test]
    fn test_fingerprint_ignores_path() {
        let a = descriptor("a", 1000, 50);
        let b = descriptor("b", 1000, 50);
        assert!(a.same_fingerprint(&b));
        assert!(!a.same_fingerprint(&descriptor("a", 1001, 50)));
        assert!(!a.same_fingerprint(&descriptor("a", 1000, 51)));
    }

    #[test]
    fn test_total_bytes() {
        let manifest = Manifest::from_descriptors(vec![
            descriptor("a", 1, 5),
            descriptor("b", 1, 7),
        ])
        .unwrap();
        assert_eq!(manifest.total_bytes(), 12);
        assert_eq!(manifest.len(), 2);
    }
}
