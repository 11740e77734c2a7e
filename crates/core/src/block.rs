//! Immutable content-addressed blocks and the in-memory block store.
//!
//! A block's key is always the SHA-256 of its payload; two blocks with equal
//! bytes are the same block. The store never mutates or deletes blocks.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;

use crate::error::{CoreError, Result};
use crate::hash::BlockHash;

/// An immutable byte payload, at most one chunk of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Payload bytes. May be empty: a zero-byte file is one empty block.
    pub data: Bytes,
}

impl Block {
    /// Create a block from payload bytes
    #[must_use]
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Payload length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The block's identity: SHA-256 of the payload
    #[must_use]
    pub fn hash(&self) -> BlockHash {
        BlockHash::of(&self.data)
    }
}

/// In-memory content-addressed block store.
///
/// One coarse mutex serializes all operations; the hot path is network-bound.
pub struct BlockStore {
    blocks: Mutex<HashMap<BlockHash, Block>>,
}

impl BlockStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(HashMap::new()),
        }
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<BlockHash, Block>> {
        self.blocks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a block under the hash of its payload. Never fails; storing a
    /// block that is already resident is a no-op (equal content, equal key).
    pub fn put(&self, block: Block) -> bool {
        let hash = block.hash();
        self.map().insert(hash, block);
        true
    }

    /// Fetch a block by hash.
    ///
    /// # Errors
    /// Returns `BlockNotFound` if the hash is not resident.
    pub fn get(&self, hash: &BlockHash) -> Result<Block> {
        self.map()
            .get(hash)
            .cloned()
            .ok_or(CoreError::BlockNotFound(*hash))
    }

    /// Return the resident subset of `hashes`, deduplicated. Order is
    /// unspecified.
    #[must_use]
    pub fn has(&self, hashes: &[BlockHash]) -> Vec<BlockHash> {
        let map = self.map();
        let unique: HashSet<&BlockHash> = hashes.iter().collect();
        unique
            .into_iter()
            .filter(|h| map.contains_key(h))
            .copied()
            .collect()
    }

    /// All resident hashes, in unspecified order
    #[must_use]
    pub fn hashes(&self) -> Vec<BlockHash> {
        self.map().keys().copied().collect()
    }

    /// Number of resident blocks
    #[must_use]
    pub fn len(&self) -> usize {
        self.map().len()
    }

    /// Whether the store holds no blocks
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

impl Default for BlockStore {
    fn default() -> Self {
        Self::new()
    }
}
