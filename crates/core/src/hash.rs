//! Content-addressed hashing using SHA-256

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// Length of a block hash rendered as lowercase hex.
pub const HEX_LEN: usize = 64;

/// A block identity: the SHA-256 digest of the block's payload (256-bit).
///
/// Byte-wise ordering of the digest is identical to lexicographic ordering
/// of its lowercase hex encoding, which the hash ring relies on.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    /// Hash arbitrary bytes
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Get raw digest bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Build from a raw 32-byte digest
    #[must_use]
    pub fn from_raw(raw: [u8; 32]) -> Self {
        Self(raw)
    }

    /// Convert to a 64-char lowercase hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-char hex string.
    ///
    /// # Errors
    /// Returns `InvalidHash` if the input is not exactly 64 hex characters.
    /// The one-char tombstone sentinel `"0"` is therefore never accepted.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        if s.len() != HEX_LEN {
            return Err(CoreError::InvalidHash(s.to_string()));
        }
        let mut raw = [0u8; 32];
        hex::decode_to_slice(s, &mut raw).map_err(|_| CoreError::InvalidHash(s.to_string()))?;
        Ok(Self(raw))
    }
}

impl FromStr for BlockHash {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "BlockHash({})", hex.get(..16).unwrap_or(&hex))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let h1 = BlockHash::of(b"hello world");
        let h2 = BlockHash::of(b"hello world");
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_hash_different_data() {
        assert_ne!(BlockHash::of(b"hello"), BlockHash::of(b"world"));
    }

    #[test]
    fn test_known_vectors() {
        // SHA-256 of the empty string: how a zero-byte file's single block hashes.
        assert_eq!(
            BlockHash::of(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            BlockHash::of(b"Hello").to_hex(),
            "185f8db32271fe25f561a6fc938b2e264306ec304eda518007d1764826381969"
        );
    }

    #[test]
    fn test_hex_roundtrip() {
        let h = BlockHash::of(b"roundtrip");
        let parsed = BlockHash::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn test_rejects_tombstone_and_garbage() {
        assert!(BlockHash::from_hex("0").is_err());
        assert!(BlockHash::from_hex("").is_err());
        assert!(BlockHash::from_hex(&"z".repeat(64)).is_err());
        assert!(BlockHash::from_hex(&"ab".repeat(31)).is_err());
    }

    #[test]
    fn test_byte_order_matches_hex_order() {
        let a = BlockHash::of(b"a");
        let b = BlockHash::of(b"b");
        assert_eq!(a.cmp(&b), a.to_hex().cmp(&b.to_hex()));
        assert_eq!(b.cmp(&a), b.to_hex().cmp(&a.to_hex()));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let h = BlockHash::of(b"serde");
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", h.to_hex()));
        let back: BlockHash = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
    }
}
