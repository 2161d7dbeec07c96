//! Item identity and per-item working directories

use crate::error::Result;
use cw_core::store::normalize_path;
use cw_core::META_DIR;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A content item, addressed by its owner and its own id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub owner_id: u64,
    pub item_id: u64,
}

impl ItemKey {
    pub fn new(owner_id: u64, item_id: u64) -> Self {
        Self { owner_id, item_id }
    }

    /// `<owner>/<item>`, relative to the snapshot root
    pub fn relative_dir(&self) -> PathBuf {
        Path::new(&self.owner_id.to_string()).join(self.item_id.to_string())
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner_id, self.item_id)
    }
}

/// Mutable file set of one item, staged wholesale by the next commit
#[derive(Debug, Clone)]
pub struct Worktree {
    dir: PathBuf,
    suffix: String,
}

impl Worktree {
    pub(crate) fn new(dir: PathBuf, suffix: String) -> Self {
        Self { dir, suffix }
    }

    /// Working directory path
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Remove item files left over from the previous revision
    ///
    /// Only top-level files carrying the item suffix are removed; returns
    /// how many were deleted.
    pub fn clear_stale(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            let matches_suffix = path
                .extension()
                .is_some_and(|ext| ext.to_str() == Some(self.suffix.as_str()));

            if entry.file_type()?.is_file() && matches_suffix {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }

        debug!(dir = %self.dir.display(), removed, "cleared stale files");
        Ok(removed)
    }

    /// Destination path for a file of the new revision
    ///
    /// Parent directories are created; names escaping the worktree or
    /// pointing into the metadata directory are rejected.
    pub fn file_path(&self, name: &str) -> Result<PathBuf> {
        let relative = normalize_path(Path::new(name))?;
        let path = self.dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    /// Write one file of the new revision
    pub fn write_file(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.file_path(name)?;
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// File name for a downloaded item file: `<file-id>.<suffix>`
    pub fn file_name(&self, file_id: u64) -> String {
        format!("{}.{}", file_id, self.suffix)
    }

    /// Start a new revision in a scratch directory under `.cw/`
    ///
    /// The worktree keeps its current files until [`Staging::promote`];
    /// dropping the staging area discards whatever was written to it.
    pub fn stage(&self) -> Result<Staging> {
        let dir = self.dir.join(META_DIR).join(INCOMING_DIR);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        std::fs::create_dir_all(&dir)?;
        Ok(Staging {
            dir,
            target: self.clone(),
        })
    }

    pub(crate) fn is_meta(path: &Path) -> bool {
        path.file_name().is_some_and(|name| name == META_DIR)
    }
}

const INCOMING_DIR: &str = "incoming";

/// Files of a revision being downloaded, invisible to commits
#[derive(Debug)]
pub struct Staging {
    dir: PathBuf,
    target: Worktree,
}

impl Staging {
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Destination path inside the staging area; same rules as
    /// [`Worktree::file_path`]
    pub fn file_path(&self, name: &str) -> Result<PathBuf> {
        let relative = normalize_path(Path::new(name))?;
        let path = self.dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    pub fn file_name(&self, file_id: u64) -> String {
        self.target.file_name(file_id)
    }

    /// Replace the worktree's item files with the staged ones
    ///
    /// Returns how many files were moved in.
    pub fn promote(self) -> Result<usize> {
        self.target.clear_stale()?;
        let mut moved = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            std::fs::rename(entry.path(), self.target.dir.join(entry.file_name()))?;
            moved += 1;
        }
        debug!(dir = %self.target.dir.display(), moved, "promoted staged files");
        Ok(moved)
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(dir = %self.dir.display(), error = %e, "failed to remove staging area");
            }
        }
    }
}
