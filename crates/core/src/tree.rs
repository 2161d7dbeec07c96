//! Tree representation for item snapshots

use crate::error::{CoreError, Result};
use crate::hash::{hash_bytes, Blake3Hash};
use ahash::AHashMap;
use smallvec::SmallVec;

/// Longest path a serialized tree can carry (`u16` length prefix)
pub const MAX_PATH_LEN: usize = u16::MAX as usize;

/// Path key; short paths stay on the stack
pub type PathKey = SmallVec<[u8; 64]>;

/// Entry in a tree (one tracked file)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// Unix permission bits (mode)
    pub mode: u32,
    /// Original content size in bytes
    pub size: u64,
    /// Hash of the blob containing this entry's content
    pub blob_hash: Blake3Hash,
}

impl Entry {
    /// Create a new regular file entry
    pub fn file(size: u64, blob_hash: Blake3Hash) -> Self {
        Self {
            mode: 0o100644,
            size,
            blob_hash,
        }
    }
}

/// A tree is the complete file set of an item at one point in time
///
/// Paths are stored as `/`-separated relative byte strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: AHashMap<PathKey, Entry>,
}

impl Tree {
    const MAGIC: [u8; 4] = *b"CWT1";

    /// Create a new empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry into the tree
    ///
    /// Paths longer than [`MAX_PATH_LEN`] bytes are rejected.
    pub fn insert(&mut self, path: &str, entry: Entry) -> Result<()> {
        if path.len() > MAX_PATH_LEN {
            return Err(CoreError::UnsafePath(format!(
                "path of {} bytes exceeds {}",
                path.len(),
                MAX_PATH_LEN
            )));
        }
        self.entries.insert(PathKey::from_slice(path.as_bytes()), entry);
        Ok(())
    }

    /// Get an entry from the tree
    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path.as_bytes())
    }

    /// Remove an entry from the tree
    pub fn remove(&mut self, path: &str) -> Option<Entry> {
        self.entries.remove(path.as_bytes())
    }

    /// Get the number of entries in the tree
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the tree is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted lexicographically by path
    pub fn sorted_entries(&self) -> Vec<(&[u8], &Entry)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(path, entry)| (path.as_slice(), entry))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// Serialize the tree to bytes (TreeV1 format)
    ///
    /// Format:
    /// - magic: "CWT1" (4 bytes)
    /// - entry_count: u32
    /// - entries (sorted lexicographically by path):
    ///   - path_len: u16
    ///   - path_bytes: [u8; path_len]
    ///   - mode: u32
    ///   - size: u64
    ///   - blob_hash: [u8; 32]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.entries.len() * 80);
        out.extend_from_slice(&Self::MAGIC);
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());

        for (path, entry) in self.sorted_entries() {
            out.extend_from_slice(&(path.len() as u16).to_le_bytes());
            out.extend_from_slice(path);
            out.extend_from_slice(&entry.mode.to_le_bytes());
            out.extend_from_slice(&entry.size.to_le_bytes());
            out.extend_from_slice(entry.blob_hash.as_bytes());
        }

        out
    }

    /// Deserialize a tree from bytes (TreeV1 format)
    pub fn deserialize(bytes: &[u8]) -> std::result::Result<Self, String> {
        let mut reader = ByteReader { bytes, pos: 0 };

        if reader.take(4)? != Self::MAGIC {
            return Err("bad magic".to_string());
        }

        let count = u32::from_le_bytes(reader.array()?);
        let mut tree = Tree::new();
        for _ in 0..count {
            let path_len = u16::from_le_bytes(reader.array()?) as usize;
            let path = PathKey::from_slice(reader.take(path_len)?);
            let mode = u32::from_le_bytes(reader.array()?);
            let size = u64::from_le_bytes(reader.array()?);
            let blob_hash = Blake3Hash::from_bytes(reader.array()?);
            tree.entries.insert(path, Entry { mode, size, blob_hash });
        }

        if reader.pos != bytes.len() {
            return Err(format!("{} trailing bytes", bytes.len() - reader.pos));
        }

        Ok(tree)
    }

    /// Compute the hash of this tree
    ///
    /// Hash is deterministic - same tree content always produces same hash
    pub fn hash(&self) -> Blake3Hash {
        hash_bytes(&self.serialize())
    }
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn take(&mut self, len: usize) -> std::result::Result<&'a [u8], String> {
        let end = self.pos + len;
        if end > self.bytes.len() {
            return Err(format!("truncated at byte {}", self.pos));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> std::result::Result<[u8; N], String> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

/// Differences between two trees
#[derive(Debug, Clone, Default)]
pub struct TreeDiff {
    /// Entries added in new tree
    pub added: Vec<(PathKey, Entry)>,
    /// Entries removed in new tree
    pub removed: Vec<(PathKey, Entry)>,
    /// Entries modified in new tree (old, new)
    pub modified: Vec<(PathKey, Entry, Entry)>,
}

impl TreeDiff {
    /// Compute the diff between two trees, each list sorted by path
    pub fn diff(old: &Tree, new: &Tree) -> Self {
        let mut diff = TreeDiff::default();

        for (path, new_entry) in &new.entries {
            match old.entries.get(path) {
                None => diff.added.push((path.clone(), *new_entry)),
                Some(old_entry) if old_entry.blob_hash != new_entry.blob_hash => {
                    diff.modified.push((path.clone(), *old_entry, *new_entry))
                }
                Some(_) => {}
            }
        }

        for (path, old_entry) in &old.entries {
            if !new.entries.contains_key(path) {
                diff.removed.push((path.clone(), *old_entry));
            }
        }

        diff.added.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        diff.removed.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        diff.modified.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        diff
    }

    /// Check if there are any changes
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Number of paths touched
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}
