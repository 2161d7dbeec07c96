//! On-disk object store for blobs, trees and snapshots

use crate::blob::BlobStore;
use crate::error::{CoreError, ObjectKind, Result};
use crate::hash::{hash_bytes, Blake3Hash};
use crate::snapshot::Snapshot;
use crate::tree::Tree;
use dashmap::DashMap;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Name of the metadata directory inside every item working directory
pub const META_DIR: &str = ".cw";

/// Object store for one item's history
///
/// Manages the `.cw/` directory inside an item working directory:
/// ```text
/// .cw/
///   HEAD
///   objects/
///     blobs/
///     trees/
///     snapshots/
///   tmp/
/// ```
pub struct ObjectStore {
    /// Path to .cw directory
    meta_dir: PathBuf,
    /// Blob storage
    blob_store: BlobStore,
    /// Tree cache (hash -> tree)
    tree_cache: DashMap<Blake3Hash, Arc<Tree>>,
}

impl ObjectStore {
    /// Initialize a store inside `workdir`; existing stores are reopened
    pub fn init(workdir: &Path) -> Result<Self> {
        let meta_dir = workdir.join(META_DIR);
        for sub in ["objects/blobs", "objects/trees", "objects/snapshots", "tmp"] {
            std::fs::create_dir_all(meta_dir.join(sub))?;
        }
        Ok(Self::at(meta_dir))
    }

    /// Open an existing store
    pub fn open(workdir: &Path) -> Result<Self> {
        let meta_dir = workdir.join(META_DIR);
        if !meta_dir.join("objects").is_dir() {
            return Err(CoreError::NotInitialized(workdir.to_path_buf()));
        }
        Ok(Self::at(meta_dir))
    }

    /// Whether `workdir` already holds a store
    pub fn exists(workdir: &Path) -> bool {
        workdir.join(META_DIR).join("objects").is_dir()
    }

    fn at(meta_dir: PathBuf) -> Self {
        let blob_store = BlobStore::new(
            meta_dir.join("objects/blobs"),
            meta_dir.join("tmp"),
        );
        Self {
            meta_dir,
            blob_store,
            tree_cache: DashMap::new(),
        }
    }

    /// Write a tree to storage
    pub fn write_tree(&self, tree: &Tree) -> Result<Blake3Hash> {
        let bytes = tree.serialize();
        let hash = hash_bytes(&bytes);
        let path = object_path(&self.meta_dir.join("objects/trees"), hash);
        if !path.exists() {
            atomic_write(&self.tmp_dir(), &path, &bytes)?;
        }
        self.tree_cache.insert(hash, Arc::new(tree.clone()));
        Ok(hash)
    }

    /// Read a tree from storage
    pub fn read_tree(&self, hash: Blake3Hash) -> Result<Arc<Tree>> {
        if let Some(tree) = self.tree_cache.get(&hash) {
            return Ok(Arc::clone(&tree));
        }

        let path = object_path(&self.meta_dir.join("objects/trees"), hash);
        let bytes = read_object(&path, ObjectKind::Tree, hash)?;
        if hash_bytes(&bytes) != hash {
            return Err(CoreError::corrupt(ObjectKind::Tree, hash, "content hash mismatch"));
        }

        let tree = Tree::deserialize(&bytes)
            .map_err(|reason| CoreError::corrupt(ObjectKind::Tree, hash, reason))?;
        let tree = Arc::new(tree);
        self.tree_cache.insert(hash, Arc::clone(&tree));
        Ok(tree)
    }

    /// Write a snapshot object, returning its id
    pub fn write_snapshot(&self, snapshot: &Snapshot) -> Result<Blake3Hash> {
        let bytes = snapshot.encode()?;
        let id = hash_bytes(&bytes);
        let path = object_path(&self.meta_dir.join("objects/snapshots"), id);
        if !path.exists() {
            atomic_write(&self.tmp_dir(), &path, &bytes)?;
        }
        Ok(id)
    }

    /// Read a snapshot object
    pub fn read_snapshot(&self, id: Blake3Hash) -> Result<Snapshot> {
        let path = object_path(&self.meta_dir.join("objects/snapshots"), id);
        let bytes = read_object(&path, ObjectKind::Snapshot, id)?;
        Snapshot::decode(id, &bytes)
    }

    /// Whether a snapshot object with this id is present
    pub fn has_snapshot(&self, id: Blake3Hash) -> bool {
        object_path(&self.meta_dir.join("objects/snapshots"), id).exists()
    }

    /// Current head snapshot, `None` before the first commit
    pub fn head(&self) -> Result<Option<Blake3Hash>> {
        let path = self.meta_dir.join("HEAD");
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        contents
            .parse()
            .map(Some)
            .map_err(|_| CoreError::CorruptHead {
                path,
                reason: format!("not a snapshot id: {:?}", contents.trim()),
            })
    }

    /// Move head to `id`
    pub fn set_head(&self, id: Blake3Hash) -> Result<()> {
        let line = format!("{}\n", id.to_hex());
        atomic_write(&self.tmp_dir(), &self.meta_dir.join("HEAD"), line.as_bytes())
    }

    /// Get the blob store
    pub fn blob_store(&self) -> &BlobStore {
        &self.blob_store
    }

    /// Get the .cw directory path
    pub fn meta_dir(&self) -> &Path {
        &self.meta_dir
    }

    fn tmp_dir(&self) -> PathBuf {
        self.meta_dir.join("tmp")
    }
}

/// Fan-out path for an object: `<root>/<hh>/<rest>`
pub(crate) fn object_path(root: &Path, hash: Blake3Hash) -> PathBuf {
    let hex = hash.to_hex();
    root.join(&hex[..2]).join(&hex[2..])
}

fn read_object(path: &Path, kind: ObjectKind, hash: Blake3Hash) -> Result<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(CoreError::MissingObject { kind, hash })
        }
        Err(e) => Err(e.into()),
    }
}

/// Atomic write helper
///
/// Writes data to a temporary file, fsyncs it, then renames it to the target path.
pub fn atomic_write(tmp_dir: &Path, target: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut tmp = tempfile::NamedTempFile::new_in(tmp_dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| CoreError::Io(e.error))?;
    Ok(())
}

/// Normalize a path for storage
///
/// - Converts to relative path with `/` separator
/// - Rejects `..`, absolute paths and the metadata directory
/// - Removes `./` prefix
pub fn normalize_path(path: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| CoreError::UnsafePath(path.display().to_string()))?;
                parts.push(part);
            }
            Component::CurDir => {}
            _ => return Err(CoreError::UnsafePath(path.display().to_string())),
        }
    }

    if parts.is_empty() || parts[0] == META_DIR {
        return Err(CoreError::UnsafePath(path.display().to_string()));
    }
    Ok(parts.join("/"))
}
