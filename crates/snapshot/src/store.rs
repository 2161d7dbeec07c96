//! Per-item snapshot histories under one root directory

use crate::diff::{patch_text, DiffSummary};
use crate::error::{Result, SnapshotError};
use crate::history::History;
use crate::item::{ItemKey, Worktree};
use chrono::{DateTime, Utc};
use cw_core::store::normalize_path;
use cw_core::{Blake3Hash, Entry, ObjectStore, Signature, Snapshot, Tree};
use std::io::{Cursor, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Result of one commit
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub snapshot: Blake3Hash,
    /// `None` for the first snapshot of an item
    pub parent: Option<Blake3Hash>,
    /// Changes against the parent; `None` when there is no parent
    pub summary: Option<DiffSummary>,
}

impl CommitOutcome {
    pub fn is_baseline(&self) -> bool {
        self.parent.is_none()
    }
}

/// Append-only snapshot histories, one working directory per item
///
/// ```text
/// <root>/<owner_id>/<item_id>/
///   <file>.<suffix>   current file set
///   .cw/              object store and HEAD
/// ```
///
/// Commits to one item must not run concurrently; callers serialize them.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
    file_suffix: String,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>, file_suffix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            file_suffix: file_suffix.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Working directory of an item
    pub fn item_dir(&self, key: ItemKey) -> PathBuf {
        self.root.join(key.relative_dir())
    }

    /// Open the item's working directory, creating its history on first use
    pub fn worktree(&self, key: ItemKey) -> Result<Worktree> {
        let dir = self.item_dir(key);
        std::fs::create_dir_all(&dir)?;
        if !ObjectStore::exists(&dir) {
            ObjectStore::init(&dir)?;
            info!(item = %key, "created snapshot history");
        }
        Ok(Worktree::new(dir, self.file_suffix.clone()))
    }

    /// Replace the item's file set and commit it
    pub fn commit(
        &self,
        key: ItemKey,
        files: &[(String, Vec<u8>)],
        author_name: &str,
        author_email: &str,
        when: DateTime<Utc>,
    ) -> Result<CommitOutcome> {
        let worktree = self.worktree(key)?;
        worktree.clear_stale()?;
        for (name, contents) in files {
            worktree.write_file(name, contents)?;
        }
        self.commit_worktree(key, author_name, author_email, when)
    }

    /// Stage the whole working directory as it is and commit it
    ///
    /// `when` is the upstream update time, not the local clock.
    pub fn commit_worktree(
        &self,
        key: ItemKey,
        author_name: &str,
        author_email: &str,
        when: DateTime<Utc>,
    ) -> Result<CommitOutcome> {
        let dir = self.item_dir(key);
        let store = ObjectStore::init(&dir)?;

        let tree = stage(&store, &dir)?;
        let root_tree = store.write_tree(&tree)?;
        let parent = store.head()?;

        let snapshot = Snapshot {
            parent,
            root_tree,
            author: Signature {
                name: author_name.to_string(),
                email: author_email.to_string(),
                when,
            },
            message: format!("update: {}", key.item_id),
        };
        let id = store.write_snapshot(&snapshot)?;
        store.set_head(id)?;

        let summary = match parent {
            Some(parent) => {
                let parent_tree = store.read_tree(store.read_snapshot(parent)?.root_tree)?;
                Some(DiffSummary::between(store.blob_store(), &parent_tree, &tree)?)
            }
            None => None,
        };

        info!(
            item = %key,
            snapshot = %id.short(),
            files = tree.len(),
            baseline = parent.is_none(),
            "committed snapshot"
        );
        Ok(CommitOutcome {
            snapshot: id,
            parent,
            summary,
        })
    }

    /// Current head of an item, `None` before the first commit
    pub fn head(&self, key: ItemKey) -> Result<Option<Blake3Hash>> {
        Ok(self.open(key)?.head()?)
    }

    /// Newest-first history, at most `limit` entries
    pub fn history(&self, key: ItemKey, limit: usize) -> Result<History> {
        let store = self.open(key)?;
        let head = store.head()?;
        Ok(History::new(Arc::new(store), head, limit))
    }

    /// Resolve a snapshot reference: head when `None`, a full id, or a unique prefix
    pub fn resolve(&self, key: ItemKey, reference: Option<&str>) -> Result<Blake3Hash> {
        let store = self.open(key)?;
        let Some(reference) = reference else {
            return store.head()?.ok_or(SnapshotError::NoSnapshots(key));
        };

        if let Ok(id) = reference.parse::<Blake3Hash>() {
            return if store.has_snapshot(id) {
                Ok(id)
            } else {
                Err(SnapshotError::UnknownSnapshot { item: key, id })
            };
        }

        let prefix = reference.to_ascii_lowercase();
        if prefix.len() >= 4 {
            let mut matching = Vec::new();
            let mut next = store.head()?;
            while let Some(id) = next {
                if id.to_hex().starts_with(&prefix) {
                    matching.push(id);
                }
                next = store.read_snapshot(id)?.parent;
            }

            match matching.len() {
                0 => {}
                1 => return Ok(matching[0]),
                matches => {
                    return Err(SnapshotError::AmbiguousRef {
                        reference: reference.to_string(),
                        matches,
                    })
                }
            }
        }

        Err(SnapshotError::UnknownRef {
            item: key,
            reference: reference.to_string(),
        })
    }

    /// Change statistics of a snapshot against its parent
    pub fn diff_summary(&self, key: ItemKey, id: Blake3Hash) -> Result<DiffSummary> {
        let store = self.open(key)?;
        let (old, new) = trees_for(&store, key, id)?;
        DiffSummary::between(store.blob_store(), &old, &new)
    }

    /// Patch text of a snapshot against its parent (or an empty tree)
    pub fn diff(&self, key: ItemKey, id: Blake3Hash) -> Result<String> {
        let store = self.open(key)?;
        let (old, new) = trees_for(&store, key, id)?;
        patch_text(store.blob_store(), &old, &new)
    }

    /// Stream the snapshot's file set as a zip archive
    ///
    /// Contents come from the object store; the working directory is not
    /// touched.
    pub fn archive<W: Write + Seek>(&self, key: ItemKey, id: Blake3Hash, writer: W) -> Result<W> {
        let store = self.open(key)?;
        let snapshot = read_snapshot(&store, key, id)?;
        let tree = store.read_tree(snapshot.root_tree)?;

        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(writer);
        for (path, entry) in tree.sorted_entries() {
            let name = String::from_utf8_lossy(path).into_owned();
            let contents = store.blob_store().read_blob(entry.blob_hash)?;
            zip.start_file(name, options)?;
            zip.write_all(&contents)?;
        }

        let writer = zip.finish()?;
        debug!(item = %key, snapshot = %id.short(), files = tree.len(), "archived snapshot");
        Ok(writer)
    }

    /// In-memory archive of a snapshot
    pub fn archive_bytes(&self, key: ItemKey, id: Blake3Hash) -> Result<Vec<u8>> {
        Ok(self.archive(key, id, Cursor::new(Vec::new()))?.into_inner())
    }

    /// Download name for an archive: `<item>-<snapshot>.zip`
    pub fn archive_name(key: ItemKey, id: Blake3Hash) -> String {
        format!("{}-{}.zip", key.item_id, id.to_hex())
    }

    fn open(&self, key: ItemKey) -> Result<ObjectStore> {
        let dir = self.item_dir(key);
        if !ObjectStore::exists(&dir) {
            return Err(SnapshotError::UnknownItem(key));
        }
        Ok(ObjectStore::open(&dir)?)
    }
}

/// Build a tree from every file in the working directory except `.cw/`
fn stage(store: &ObjectStore, dir: &Path) -> Result<Tree> {
    let mut tree = Tree::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !Worktree::is_meta(entry.path()));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };

        let path = normalize_path(relative)?;
        let (hash, size) = store.blob_store().write_file(entry.path())?;
        tree.insert(&path, Entry::file(size, hash))?;
    }

    Ok(tree)
}

fn read_snapshot(store: &ObjectStore, key: ItemKey, id: Blake3Hash) -> Result<Snapshot> {
    if !store.has_snapshot(id) {
        return Err(SnapshotError::UnknownSnapshot { item: key, id });
    }
    Ok(store.read_snapshot(id)?)
}

fn trees_for(store: &ObjectStore, key: ItemKey, id: Blake3Hash) -> Result<(Arc<Tree>, Arc<Tree>)> {
    let snapshot = read_snapshot(store, key, id)?;
    let new = store.read_tree(snapshot.root_tree)?;
    let old = match snapshot.parent {
        Some(parent) => store.read_tree(store.read_snapshot(parent)?.root_tree)?,
        None => Arc::new(Tree::new()),
    };
    Ok((old, new))
}
