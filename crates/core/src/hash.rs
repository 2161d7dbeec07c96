//! BLAKE3 hashing primitives for content-addressed storage

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// A BLAKE3 hash (32 bytes)
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Blake3Hash([u8; 32]);

impl Blake3Hash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to lowercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated hex form used in logs and listings
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }

    /// Parse from a 64 character hex string
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != 64 {
            return Err(CoreError::InvalidHash(hex.to_string()));
        }

        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex, &mut bytes).map_err(|_| CoreError::InvalidHash(hex.to_string()))?;
        Ok(Self(bytes))
    }
}

impl FromStr for Blake3Hash {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s.trim())
    }
}

impl std::fmt::Debug for Blake3Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Blake3Hash({})", self.to_hex())
    }
}

impl std::fmt::Display for Blake3Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Content address of `data`
pub fn hash_bytes(data: &[u8]) -> Blake3Hash {
    Blake3Hash::from_bytes(*blake3::hash(data).as_bytes())
}

/// Hash a file's contents without reading it into memory
pub fn hash_file(path: &Path) -> Result<Blake3Hash> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(Blake3Hash::from_bytes(*hasher.finalize().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_consistency() {
        let data = b"hello world";
        assert_eq!(hash_bytes(data), hash_bytes(data));
    }

    #[test]
    fn test_hex_encoding_roundtrip() {
        let original = Blake3Hash::from_bytes([42; 32]);
        let decoded = Blake3Hash::from_hex(&original.to_hex()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_hex_decoding_invalid_length() {
        assert!(Blake3Hash::from_hex("abc").is_err());
        assert!(Blake3Hash::from_hex("").is_err());
        assert!(Blake3Hash::from_hex(&"a".repeat(63)).is_err());
    }

    #[test]
    fn test_hex_decoding_invalid_chars() {
        let invalid = "g".repeat(64);
        assert!(matches!(
            Blake3Hash::from_hex(&invalid),
            Err(CoreError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_from_str_trims_whitespace() {
        let hash = hash_bytes(b"head");
        let parsed: Blake3Hash = format!("{}\n", hash).parse().unwrap();
        assert_eq!(parsed, hash);
    }

    #[test]
    fn test_short_is_prefix() {
        let hash = hash_bytes(b"prefix");
        assert_eq!(hash.short().len(), 12);
        assert!(hash.to_hex().starts_with(&hash.short()));
    }

    #[test]
    fn test_hash_file_matches_bytes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("test.txt");

        let data = b"test file content";
        std::fs::write(&file_path, data).unwrap();

        assert_eq!(hash_file(&file_path).unwrap(), hash_bytes(data));
    }

    #[test]
    fn test_different_data_different_hash() {
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }
}
