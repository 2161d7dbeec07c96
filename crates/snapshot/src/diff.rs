//! Line-level diff statistics and patch text between two trees

use crate::error::Result;
use cw_core::{BlobStore, Tree, TreeDiff};
use similar::{ChangeTag, TextDiff};
use std::fmt;

/// How a path changed between two revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Removed,
    Modified,
}

/// Per-file change counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub path: String,
    pub status: FileStatus,
    pub insertions: usize,
    pub deletions: usize,
    /// Binary files have no line counts
    pub binary: bool,
}

/// Files touched and line deltas between a snapshot and its parent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub files: Vec<FileStat>,
}

impl DiffSummary {
    /// Compute the summary between two trees whose blobs live in `blobs`
    pub fn between(blobs: &BlobStore, old: &Tree, new: &Tree) -> Result<Self> {
        let mut files = Vec::new();
        for change in changes(blobs, old, new)? {
            let (insertions, deletions) = if change.binary() {
                (0, 0)
            } else {
                line_counts(&change.old, &change.new)
            };
            files.push(FileStat {
                binary: change.binary(),
                path: change.path,
                status: change.status,
                insertions,
                deletions,
            });
        }
        Ok(Self { files })
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files_changed(&self) -> usize {
        self.files.len()
    }

    pub fn insertions(&self) -> usize {
        self.files.iter().map(|f| f.insertions).sum()
    }

    pub fn deletions(&self) -> usize {
        self.files.iter().map(|f| f.deletions).sum()
    }
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let files = self.files_changed();
        write!(
            f,
            "{} file{} changed, {} insertion{}(+), {} deletion{}(-)",
            files,
            plural(files),
            self.insertions(),
            plural(self.insertions()),
            self.deletions(),
            plural(self.deletions()),
        )
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Render a plain unified patch from `old` to `new`
pub fn patch_text(blobs: &BlobStore, old: &Tree, new: &Tree) -> Result<String> {
    let mut out = String::new();
    for change in changes(blobs, old, new)? {
        let (from, to) = match change.status {
            FileStatus::Added => ("/dev/null".to_string(), format!("b/{}", change.path)),
            FileStatus::Removed => (format!("a/{}", change.path), "/dev/null".to_string()),
            FileStatus::Modified => (format!("a/{}", change.path), format!("b/{}", change.path)),
        };

        out.push_str(&format!("diff a/{0} b/{0}\n", change.path));
        if change.binary() {
            out.push_str(&format!("Binary files {} and {} differ\n", from, to));
            continue;
        }

        let old_text = String::from_utf8_lossy(&change.old);
        let new_text = String::from_utf8_lossy(&change.new);
        let diff = TextDiff::from_lines(old_text.as_ref(), new_text.as_ref());
        out.push_str(
            &diff
                .unified_diff()
                .context_radius(3)
                .header(&from, &to)
                .to_string(),
        );
    }
    Ok(out)
}

/// Check if content is binary (contains null bytes in first 8KB)
pub fn is_binary(content: &[u8]) -> bool {
    content.iter().take(8192).any(|&b| b == 0)
}

struct FileChange {
    path: String,
    status: FileStatus,
    old: Vec<u8>,
    new: Vec<u8>,
}

impl FileChange {
    fn binary(&self) -> bool {
        is_binary(&self.old) || is_binary(&self.new)
    }
}

fn changes(blobs: &BlobStore, old: &Tree, new: &Tree) -> Result<Vec<FileChange>> {
    let diff = TreeDiff::diff(old, new);
    let mut changes = Vec::with_capacity(diff.len());

    for (path, entry) in &diff.added {
        changes.push(FileChange {
            path: String::from_utf8_lossy(path).into_owned(),
            status: FileStatus::Added,
            old: Vec::new(),
            new: blobs.read_blob(entry.blob_hash)?,
        });
    }
    for (path, entry) in &diff.removed {
        changes.push(FileChange {
            path: String::from_utf8_lossy(path).into_owned(),
            status: FileStatus::Removed,
            old: blobs.read_blob(entry.blob_hash)?,
            new: Vec::new(),
        });
    }
    for (path, old_entry, new_entry) in &diff.modified {
        changes.push(FileChange {
            path: String::from_utf8_lossy(path).into_owned(),
            status: FileStatus::Modified,
            old: blobs.read_blob(old_entry.blob_hash)?,
            new: blobs.read_blob(new_entry.blob_hash)?,
        });
    }

    changes.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(changes)
}

fn line_counts(old: &[u8], new: &[u8]) -> (usize, usize) {
    let old_text = String::from_utf8_lossy(old);
    let new_text = String::from_utf8_lossy(new);
    let diff = TextDiff::from_lines(old_text.as_ref(), new_text.as_ref());

    let mut insertions = 0;
    let mut deletions = 0;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => insertions += 1,
            ChangeTag::Delete => deletions += 1,
            ChangeTag::Equal => {}
        }
    }
    (insertions, deletions)
}
