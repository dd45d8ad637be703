//! Diff engine: remote manifest vs. local tree.
//!
//! The remote manifest becomes a path lookup. The local tree is walked once;
//! each local file is either new (create), changed (update) or unchanged, and
//! a matched path is removed from the lookup. Whatever is left in the lookup
//! after the walk was never seen locally and is deleted. A path is therefore
//! never both updated and deleted.
//!
//! Change detection compares (mtime, size) only. A local file that differs in
//! content but agrees on both is reported unchanged and is not transferred.
//!
//! [`Diff`] is a lazy iterator: file content is read when its operation is
//! produced, so the whole change set is never buffered. It cannot be rewound;
//! run [`diff`] again to start over. A walk or read error ends the iteration
//! without emitting any deletes, since the set of local paths is incomplete.

use deploy_core::fs::{FileWalker, WalkOptions, WalkedFile};
use deploy_core::protocol::encode_payload;
use deploy_core::{ClientMessage, FileDescriptor, Manifest, WalkError};
use std::collections::HashMap;
use std::path::Path;

/// A single change needed to bring the remote tree in line with the local one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create {
        path: String,
        content: Vec<u8>,
        mtime: i64,
    },
    Update {
        path: String,
        content: Vec<u8>,
        mtime: i64,
    },
    Delete {
        path: String,
    },
}

impl Operation {
    pub fn path(&self) -> &str {
        match self {
            Operation::Create { path, .. }
            | Operation::Update { path, .. }
            | Operation::Delete { path } => path,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Create { .. } => "create",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
        }
    }

    /// Bytes carried by the operation
    pub fn payload_len(&self) -> u64 {
        match self {
            Operation::Create { content, .. } | Operation::Update { content, .. } => {
                content.len() as u64
            }
            Operation::Delete { .. } => 0,
        }
    }

    /// Wire form. Create and update both become `store`.
    pub fn into_message(self, site: &str) -> ClientMessage {
        match self {
            Operation::Create {
                path,
                content,
                mtime,
            }
            | Operation::Update {
                path,
                content,
                mtime,
            } => ClientMessage::Store {
                site: site.to_string(),
                path,
                data: encode_payload(&content),
                mtime: Some(mtime),
            },
            Operation::Delete { path } => ClientMessage::Delete {
                site: site.to_string(),
                path,
            },
        }
    }
}

/// Tally of what a diff produced so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Local paths whose fingerprint matched the remote one
    pub unchanged: Vec<String>,
}

/// Lazy sequence of operations; see the module docs
pub struct Diff {
    walker: Option<FileWalker>,
    remote: HashMap<String, FileDescriptor>,
    deletes: Option<std::vec::IntoIter<String>>,
    stats: DiffStats,
}

/// Start diffing `remote` against the tree under `local_root`
pub fn diff(remote: Manifest, local_root: &Path, options: WalkOptions) -> Diff {
    Diff {
        walker: Some(FileWalker::new(local_root, options)),
        remote: remote.into_lookup(),
        deletes: None,
        stats: DiffStats::default(),
    }
}

impl Diff {
    pub fn stats(&self) -> &DiffStats {
        &self.stats
    }

    pub fn into_stats(self) -> DiffStats {
        self.stats
    }

    fn classify(&mut self, file: WalkedFile) -> Result<Option<Operation>, WalkError> {
        let local = file.descriptor;

        match self.remote.remove(&local.path) {
            None => {
                let content = read_content(&file.path)?;
                self.stats.created += 1;
                Ok(Some(Operation::Create {
                    path: local.path,
                    content,
                    mtime: local.mtime,
                }))
            }
            Some(remote) if remote.same_fingerprint(&local) => {
                self.stats.unchanged.push(local.path);
                Ok(None)
            }
            Some(_) => {
                let content = read_content(&file.path)?;
                self.stats.updated += 1;
                Ok(Some(Operation::Update {
                    path: local.path,
                    content,
                    mtime: local.mtime,
                }))
            }
        }
    }

    fn finish_walk(&mut self) {
        self.walker = None;
        let mut remaining: Vec<String> = self.remote.drain().map(|(path, _)| path).collect();
        remaining.sort();
        self.deletes = Some(remaining.into_iter());
    }

    fn abort(&mut self) {
        self.walker = None;
        self.deletes = None;
        self.remote.clear();
    }
}

impl Iterator for Diff {
    type Item = Result<Operation, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(walker) = self.walker.as_mut() {
            let result = match walker.next() {
                Some(Ok(file)) => self.classify(file),
                Some(Err(e)) => Err(e),
                None => {
                    self.finish_walk();
                    break;
                }
            };

            match result {
                Ok(Some(operation)) => return Some(Ok(operation)),
                Ok(None) => continue,
                Err(e) => {
                    self.abort();
                    return Some(Err(e));
                }
            }
        }

        let path = self.deletes.as_mut()?.next()?;
        self.stats.deleted += 1;
        Some(Ok(Operation::Delete { path }))
    }
}

fn read_content(path: &Path) -> Result<Vec<u8>, WalkError> {
    std::fs::read(path).map_err(|source| WalkError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    fn descriptor(path: &str, mtime: i64, size: u64) -> FileDescriptor {
        FileDescriptor {
            path: path.to_string(),
            mtime,
            size,
        }
    }

    /// Write a file and pin its mtime (epoch ms)
    fn write_file(root: &Path, path: &str, content: &[u8], mtime_ms: i64) {
        let full = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(&full, content).unwrap();
        set_file_mtime(
            &full,
            FileTime::from_unix_time(mtime_ms / 1000, ((mtime_ms % 1000) * 1_000_000) as u32),
        )
        .unwrap();
    }

    fn run(remote: Manifest, root: &Path) -> (Vec<Operation>, DiffStats) {
        let mut diff = diff(remote, root, WalkOptions::default());
        let operations = diff.by_ref().collect::<Result<Vec<_>, _>>().unwrap();
        (operations, diff.into_stats())
    }

    fn paths_of(operations: &[Operation], kind: &str) -> Vec<String> {
        let mut paths: Vec<String> = operations
            .iter()
            .filter(|op| op.kind() == kind)
            .map(|op| op.path().to_string())
            .collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_new_file_is_created() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "index.html", &[b'x'; 50], 1000);
        write_file(temp.path(), "style.css", b"body{}", 5000);

        let remote = Manifest::from_descriptors(vec![descriptor("index.html", 1000, 50)]).unwrap();
        let (operations, stats) = run(remote, temp.path());

        assert_eq!(
            operations,
            vec![Operation::Create {
                path: "style.css".to_string(),
                content: b"body{}".to_vec(),
                mtime: 5000,
            }]
        );
        assert_eq!(stats.unchanged, vec!["index.html"]);
        assert_eq!((stats.created, stats.updated, stats.deleted), (1, 0, 0));
    }

    #[test]
    fn test_missing_local_file_is_deleted() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "index.html", b"hi", 1000);

        let remote = Manifest::from_descriptors(vec![
            descriptor("index.html", 1000, 2),
            descriptor("old.js", 1000, 10),
        ])
        .unwrap();
        let (operations, _) = run(remote, temp.path());

        assert_eq!(
            operations,
            vec![Operation::Delete {
                path: "old.js".to_string()
            }]
        );
    }

    #[test]
    fn test_changed_mtime_or_size_is_updated() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "newer.html", b"12345", 2000);
        write_file(temp.path(), "bigger.html", b"123456", 1000);

        let remote = Manifest::from_descriptors(vec![
            descriptor("newer.html", 1000, 5),
            descriptor("bigger.html", 1000, 5),
        ])
        .unwrap();
        let (operations, _) = run(remote, temp.path());

        assert_eq!(paths_of(&operations, "update"), vec!["bigger.html", "newer.html"]);
        assert!(paths_of(&operations, "delete").is_empty());
    }

    #[test]
    fn test_same_fingerprint_different_content_is_unchanged() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "index.html", b"NEW CONTENT", 1000);

        // Same mtime and size, different bytes on the remote side
        let remote = Manifest::from_descriptors(vec![descriptor("index.html", 1000, 11)]).unwrap();
        let (operations, stats) = run(remote, temp.path());

        assert!(operations.is_empty());
        assert_eq!(stats.unchanged, vec!["index.html"]);
    }

    #[test]
    fn test_partition_is_disjoint_and_complete() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "same.txt", b"aa", 1000);
        write_file(temp.path(), "changed.txt", b"bbb", 3000);
        write_file(temp.path(), "new/added.txt", b"c", 1000);
        write_file(temp.path(), "new/deeper/added2.txt", b"dd", 1000);

        let remote = Manifest::from_descriptors(vec![
            descriptor("same.txt", 1000, 2),
            descriptor("changed.txt", 1000, 3),
            descriptor("gone.txt", 1000, 1),
            descriptor("gone/dir/file.txt", 1000, 1),
        ])
        .unwrap();
        let remote_paths: BTreeSet<String> = remote.paths().map(str::to_string).collect();

        let (operations, stats) = run(remote, temp.path());

        let creates: BTreeSet<String> = paths_of(&operations, "create").into_iter().collect();
        let updates: BTreeSet<String> = paths_of(&operations, "update").into_iter().collect();
        let deletes: BTreeSet<String> = paths_of(&operations, "delete").into_iter().collect();
        let unchanged: BTreeSet<String> = stats.unchanged.iter().cloned().collect();

        let sets = [&creates, &updates, &deletes, &unchanged];
        for (i, a) in sets.iter().enumerate() {
            for b in sets.iter().skip(i + 1) {
                assert!(a.is_disjoint(b), "{a:?} overlaps {b:?}");
            }
        }

        let local_paths: BTreeSet<String> = ["same.txt", "changed.txt", "new/added.txt", "new/deeper/added2.txt"]
            .iter()
            .map(|p| p.to_string())
            .collect();
        let covered: BTreeSet<String> = sets.iter().flat_map(|s| s.iter().cloned()).collect();
        let expected: BTreeSet<String> = remote_paths.union(&local_paths).cloned().collect();
        assert_eq!(covered, expected);

        assert_eq!(deletes, ["gone.txt", "gone/dir/file.txt"].iter().map(|p| p.to_string()).collect());
        assert_eq!(updates, ["changed.txt".to_string()].into_iter().collect());
    }

    #[test]
    fn test_deletes_come_after_walk_in_sorted_order() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "keep.txt", b"k", 1000);

        let remote = Manifest::from_descriptors(vec![
            descriptor("z.txt", 1, 1),
            descriptor("a.txt", 1, 1),
            descriptor("m/n.txt", 1, 1),
        ])
        .unwrap();
        let (operations, _) = run(remote, temp.path());

        let kinds: Vec<&str> = operations.iter().map(Operation::kind).collect();
        assert_eq!(kinds, vec!["create", "delete", "delete", "delete"]);
        let deletes: Vec<&str> = operations[1..].iter().map(Operation::path).collect();
        assert_eq!(deletes, vec!["a.txt", "m/n.txt", "z.txt"]);
    }

    #[test]
    fn test_missing_local_root_yields_error_and_no_deletes() {
        let temp = TempDir::new().unwrap();
        let remote = Manifest::from_descriptors(vec![descriptor("index.html", 1, 1)]).unwrap();

        let mut diff = diff(remote, &temp.path().join("missing"), WalkOptions::default());

        assert!(matches!(diff.next(), Some(Err(_))));
        assert!(diff.next().is_none());
        assert_eq!(diff.stats().deleted, 0);
    }

    #[test]
    fn test_operations_are_produced_lazily() {
        let temp = TempDir::new().unwrap();
        for i in 0..5 {
            write_file(temp.path(), &format!("f{i}.txt"), b"x", 1000);
        }

        let mut diff = diff(Manifest::new(), temp.path(), WalkOptions::default());
        assert!(matches!(diff.next(), Some(Ok(Operation::Create { .. }))));
        assert_eq!(diff.stats().created, 1);
        assert_eq!(diff.count(), 4);
    }

    #[test]
    fn test_store_message_carries_mtime() {
        let operation = Operation::Update {
            path: "index.html".to_string(),
            content: b"hi".to_vec(),
            mtime: 1234,
        };

        match operation.into_message("demo.example.com") {
            ClientMessage::Store { site, path, data, mtime } => {
                assert_eq!(site, "demo.example.com");
                assert_eq!(path, "index.html");
                assert_eq!(data, "aGk=");
                assert_eq!(mtime, Some(1234));
            }
            other => panic!("expected store, got {:?}", other),
        }
    }
}
