//! Blob storage with compression and content-addressing

use crate::error::{CoreError, ObjectKind, Result};
use crate::hash::{hash_bytes, hash_file, Blake3Hash};
use crate::store::{atomic_write, object_path};
use std::path::{Path, PathBuf};

/// Blobs at or below this size are stored raw
const COMPRESSION_THRESHOLD: usize = 4 * 1024;

/// zstd level used for stored blobs
const COMPRESSION_LEVEL: i32 = 3;

/// Blob header format (version 1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHeaderV1 {
    /// Flags: bit0=compressed, bit1-7=reserved
    pub flags: u8,
    /// Original size (before compression)
    pub orig_len: u64,
    /// Stored size (after compression, if compressed)
    pub stored_len: u64,
}

impl BlobHeaderV1 {
    const MAGIC: [u8; 4] = *b"CWB1";
    const FLAG_COMPRESSED: u8 = 0b0000_0001;

    /// magic(4) + flags(1) + orig_len(8) + stored_len(8)
    pub const LEN: usize = 21;

    /// Create a new blob header
    pub fn new(orig_len: u64, stored_len: u64, compressed: bool) -> Self {
        let flags = if compressed { Self::FLAG_COMPRESSED } else { 0 };
        Self {
            flags,
            orig_len,
            stored_len,
        }
    }

    /// Check if blob is compressed
    pub fn is_compressed(&self) -> bool {
        (self.flags & Self::FLAG_COMPRESSED) != 0
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[..4].copy_from_slice(&Self::MAGIC);
        out[4] = self.flags;
        out[5..13].copy_from_slice(&self.orig_len.to_le_bytes());
        out[13..21].copy_from_slice(&self.stored_len.to_le_bytes());
        out
    }

    /// Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, String> {
        if bytes.len() < Self::LEN {
            return Err(format!("header truncated ({} bytes)", bytes.len()));
        }
        if bytes[..4] != Self::MAGIC {
            return Err("bad magic".to_string());
        }

        let mut orig = [0u8; 8];
        let mut stored = [0u8; 8];
        orig.copy_from_slice(&bytes[5..13]);
        stored.copy_from_slice(&bytes[13..21]);

        Ok(Self {
            flags: bytes[4],
            orig_len: u64::from_le_bytes(orig),
            stored_len: u64::from_le_bytes(stored),
        })
    }
}

/// Encode file content into its stored representation (header + payload)
pub fn encode_blob(data: &[u8]) -> Result<Vec<u8>> {
    let compressed = if data.len() > COMPRESSION_THRESHOLD {
        let packed = zstd::bulk::compress(data, COMPRESSION_LEVEL)?;
        // Only keep the compressed form when it actually saves space
        (packed.len() < data.len()).then_some(packed)
    } else {
        None
    };

    let (payload, is_compressed) = match compressed {
        Some(ref packed) => (packed.as_slice(), true),
        None => (data, false),
    };

    let header = BlobHeaderV1::new(data.len() as u64, payload.len() as u64, is_compressed);
    let mut out = Vec::with_capacity(BlobHeaderV1::LEN + payload.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Decode a stored blob and verify it against its content hash
pub fn decode_blob(hash: Blake3Hash, stored: &[u8]) -> Result<Vec<u8>> {
    let header = BlobHeaderV1::from_bytes(stored)
        .map_err(|reason| CoreError::corrupt(ObjectKind::Blob, hash, reason))?;
    let payload = &stored[BlobHeaderV1::LEN..];

    if payload.len() as u64 != header.stored_len {
        return Err(CoreError::corrupt(
            ObjectKind::Blob,
            hash,
            format!("expected {} stored bytes, found {}", header.stored_len, payload.len()),
        ));
    }

    // Streaming decode sizes the buffer from the frame itself, never from
    // the untrusted header length
    let data = if header.is_compressed() {
        zstd::stream::decode_all(payload)
            .map_err(|e| CoreError::corrupt(ObjectKind::Blob, hash, e.to_string()))?
    } else {
        payload.to_vec()
    };

    if data.len() as u64 != header.orig_len {
        return Err(CoreError::corrupt(
            ObjectKind::Blob,
            hash,
            format!("expected {} bytes, decoded {}", header.orig_len, data.len()),
        ));
    }

    if hash_bytes(&data) != hash {
        return Err(CoreError::corrupt(ObjectKind::Blob, hash, "content hash mismatch"));
    }

    Ok(data)
}

/// Blob storage rooted at `objects/blobs`
pub struct BlobStore {
    /// Root directory for blob storage
    root: PathBuf,
    /// Scratch directory for atomic writes
    tmp_dir: PathBuf,
}

impl BlobStore {
    /// Create a new blob store
    pub fn new(root: PathBuf, tmp_dir: PathBuf) -> Self {
        Self { root, tmp_dir }
    }

    /// Write a blob to storage, returning its content hash
    pub fn write_blob(&self, data: &[u8]) -> Result<Blake3Hash> {
        let hash = hash_bytes(data);
        if self.has_blob(hash) {
            return Ok(hash);
        }

        let encoded = encode_blob(data)?;
        atomic_write(&self.tmp_dir, &self.blob_path(hash), &encoded)?;
        Ok(hash)
    }

    /// Store the content of a file on disk
    ///
    /// The file is hashed in a streaming pass first so unchanged files are
    /// never read into memory a second time.
    pub fn write_file(&self, path: &Path) -> Result<(Blake3Hash, u64)> {
        let hash = hash_file(path)?;
        let size = std::fs::metadata(path)?.len();
        if !self.has_blob(hash) {
            let data = std::fs::read(path)?;
            // The file may have changed between the two reads
            let written = self.write_blob(&data)?;
            return Ok((written, data.len() as u64));
        }
        Ok((hash, size))
    }

    /// Read a blob from storage
    pub fn read_blob(&self, hash: Blake3Hash) -> Result<Vec<u8>> {
        let stored = match std::fs::read(self.blob_path(hash)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CoreError::MissingObject {
                    kind: ObjectKind::Blob,
                    hash,
                })
            }
            Err(e) => return Err(e.into()),
        };
        decode_blob(hash, &stored)
    }

    /// Check if a blob exists
    pub fn has_blob(&self, hash: Blake3Hash) -> bool {
        self.blob_path(hash).exists()
    }

    /// Get the filesystem path for a blob
    fn blob_path(&self, hash: Blake3Hash) -> PathBuf {
        object_path(&self.root, hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob_store(dir: &Path) -> BlobStore {
        let root = dir.join("blobs");
        let tmp = dir.join("tmp");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&tmp).unwrap();
        BlobStore::new(root, tmp)
    }

    #[test]
    fn test_blob_header_serialization() {
        let header = BlobHeaderV1::new(1000, 500, true);
        let parsed = BlobHeaderV1::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(header, parsed);
        assert!(parsed.is_compressed());
    }

    #[test]
    fn test_blob_header_rejects_bad_magic() {
        let mut bytes = BlobHeaderV1::new(1, 1, false).to_bytes();
        bytes[0] = b'X';
        assert!(BlobHeaderV1::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_small_blob_stored_raw() {
        let encoded = encode_blob(b"tiny").unwrap();
        let header = BlobHeaderV1::from_bytes(&encoded).unwrap();
        assert!(!header.is_compressed());
        assert_eq!(decode_blob(hash_bytes(b"tiny"), &encoded).unwrap(), b"tiny");
    }

    #[test]
    fn test_blob_compression() {
        let data = b"hello world".repeat(1000);
        let encoded = encode_blob(&data).unwrap();
        let header = BlobHeaderV1::from_bytes(&encoded).unwrap();
        assert!(header.is_compressed());
        assert!(encoded.len() < data.len());
        assert_eq!(decode_blob(hash_bytes(&data), &encoded).unwrap(), data);
    }

    #[test]
    fn test_blob_store_write_read() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = blob_store(temp_dir.path());

        let hash = store.write_blob(b"test data").unwrap();
        assert!(store.has_blob(hash));
        assert_eq!(store.read_blob(hash).unwrap(), b"test data");
    }

    #[test]
    fn test_missing_blob_is_named_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = blob_store(temp_dir.path());

        let err = store.read_blob(hash_bytes(b"never written")).unwrap_err();
        assert!(matches!(err, CoreError::MissingObject { kind: ObjectKind::Blob, .. }));
    }

    #[test]
    fn test_tampered_blob_is_corrupt() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = blob_store(temp_dir.path());

        let hash = store.write_blob(b"original").unwrap();
        let path = store.blob_path(hash);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        let err = store.read_blob(hash).unwrap_err();
        assert!(matches!(err, CoreError::CorruptObject { .. }));
    }

    #[test]
    fn test_oversized_length_header_is_corrupt() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = blob_store(temp_dir.path());

        let data = b"hello world".repeat(1000);
        let hash = store.write_blob(&data).unwrap();
        let path = store.blob_path(hash);
        let mut bytes = std::fs::read(&path).unwrap();
        assert!(BlobHeaderV1::from_bytes(&bytes).unwrap().is_compressed());
        bytes[5..13].copy_from_slice(&u64::MAX.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        let err = store.read_blob(hash).unwrap_err();
        assert!(matches!(err, CoreError::CorruptObject { kind: ObjectKind::Blob, .. }));
    }

    #[test]
    fn test_raw_blob_length_mismatch_is_corrupt() {
        let mut encoded = encode_blob(b"tiny").unwrap();
        encoded[5..13].copy_from_slice(&9u64.to_le_bytes());
        assert!(matches!(
            decode_blob(hash_bytes(b"tiny"), &encoded),
            Err(CoreError::CorruptObject { .. })
        ));
    }

    #[test]
    fn test_write_file_dedupes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = blob_store(temp_dir.path());
        let file = temp_dir.path().join("a.osu");
        std::fs::write(&file, b"same content").unwrap();

        let (first, size) = store.write_file(&file).unwrap();
        let (second, _) = store.write_file(&file).unwrap();
        assert_eq!(first, second);
        assert_eq!(size, 12);
    }
}
