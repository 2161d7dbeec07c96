//! Snapshot objects: one committed revision of an item's file set

use crate::error::{CoreError, ObjectKind, Result};
use crate::hash::{hash_bytes, Blake3Hash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author identity and the time the change happened upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub when: DateTime<Utc>,
}

/// An immutable revision
///
/// The snapshot id is the BLAKE3 hash of the encoded object. Since the
/// parent id is part of the encoding, two snapshots with the same tree on
/// different points of the chain never collide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Previous snapshot of the same item
    pub parent: Option<Blake3Hash>,
    /// Root tree hash for this snapshot
    pub root_tree: Blake3Hash,
    pub author: Signature,
    pub message: String,
}

impl Snapshot {
    const MAGIC: [u8; 4] = *b"CWS1";

    /// Encode into the stored form
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut out = Vec::with_capacity(4 + body.len());
        out.extend_from_slice(&Self::MAGIC);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode a stored snapshot, checking it against its id
    pub fn decode(id: Blake3Hash, bytes: &[u8]) -> Result<Self> {
        if hash_bytes(bytes) != id {
            return Err(CoreError::corrupt(ObjectKind::Snapshot, id, "content hash mismatch"));
        }
        if bytes.len() < 4 || bytes[..4] != Self::MAGIC {
            return Err(CoreError::corrupt(ObjectKind::Snapshot, id, "bad magic"));
        }
        bincode::deserialize(&bytes[4..])
            .map_err(|e| CoreError::corrupt(ObjectKind::Snapshot, id, e.to_string()))
    }

    /// Content hash identifying this snapshot
    pub fn id(&self) -> Result<Blake3Hash> {
        Ok(hash_bytes(&self.encode()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(parent: Option<Blake3Hash>) -> Snapshot {
        Snapshot {
            parent,
            root_tree: hash_bytes(b"tree"),
            author: Signature {
                name: "mapper".to_string(),
                email: "nobody@localhost".to_string(),
                when: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            },
            message: "update: 42".to_string(),
        }
    }

    #[test]
    fn test_encode_decode() {
        let snapshot = sample(None);
        let bytes = snapshot.encode().unwrap();
        let id = hash_bytes(&bytes);
        assert_eq!(Snapshot::decode(id, &bytes).unwrap(), snapshot);
        assert_eq!(snapshot.id().unwrap(), id);
    }

    #[test]
    fn test_parent_changes_id() {
        let first = sample(None);
        let second = sample(Some(first.id().unwrap()));
        assert_ne!(first.id().unwrap(), second.id().unwrap());
    }

    #[test]
    fn test_decode_detects_tampering() {
        let bytes = sample(None).encode().unwrap();
        let id = hash_bytes(&bytes);
        let mut tampered = bytes.clone();
        tampered[6] ^= 0x01;
        assert!(matches!(
            Snapshot::decode(id, &tampered),
            Err(CoreError::CorruptObject { .. })
        ));
    }
}
