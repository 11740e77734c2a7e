//! Versioned per-file metadata and the metadata store.
//!
//! Each file carries a strictly increasing version and a manifest: the
//! ordered block hashes composing it, or a deletion marker. On the wire a
//! deleted file's manifest is the reserved one-element list `["0"]`; the
//! sentinel is a single character and can never collide with a real 64-char
//! hex digest.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;
use crate::hash::BlockHash;
use crate::ring::ConsistentHashRing;

/// Reserved wire token marking a deleted file's manifest.
pub const TOMBSTONE: &str = "0";

/// The ordered block hashes composing a file, or a deletion marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    /// File contents as an ordered, non-empty block hash list
    Live(Vec<BlockHash>),
    /// The file has been deleted
    Deleted,
}

impl Manifest {
    /// Whether this manifest marks a deletion
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }

    /// Render as the wire-level hash list; deletion becomes `["0"]`.
    #[must_use]
    pub fn to_wire(&self) -> Vec<String> {
        match self {
            Self::Live(hashes) => hashes.iter().map(BlockHash::to_hex).collect(),
            Self::Deleted => vec![TOMBSTONE.to_string()],
        }
    }

    /// Parse the wire-level hash list.
    ///
    /// # Errors
    /// Returns `Protocol` for an empty list and `InvalidHash` for any entry
    /// that is neither the tombstone sentinel nor a 64-char hex digest.
    pub fn from_wire(entries: &[String]) -> Result<Self, CoreError> {
        if entries.is_empty() {
            return Err(CoreError::Protocol(
                "file manifest must not be empty".to_string(),
            ));
        }
        if entries.len() == 1 && entries[0] == TOMBSTONE {
            return Ok(Self::Deleted);
        }
        let hashes = entries
            .iter()
            .map(|e| BlockHash::from_hex(e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::Live(hashes))
    }
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<String>::deserialize(deserializer)?;
        Self::from_wire(&entries).map_err(D::Error::custom)
    }
}

/// Metadata for one synchronized file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetaData {
    /// File name relative to the sync directory (flat, no separators)
    pub filename: String,
    /// Strictly increasing version, starting at 1
    pub version: i32,
    /// Ordered block hashes, or the deletion marker
    pub manifest: Manifest,
}

/// Mapping from filename to its metadata
pub type FileInfoMap = HashMap<String, FileMetaData>;

/// Result of a conditional metadata update.
///
/// Rejection is an in-band outcome, not an error; on the wire it is the
/// reserved version `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The update was applied; carries the committed version
    Accepted(i32),
    /// The proposed version was not exactly one past the current one
    Rejected,
}

/// Wire encoding of a rejected update.
pub const REJECTED_VERSION: i32 = -1;

impl UpdateOutcome {
    /// Wire form: the committed version, or `-1` for rejection
    #[must_use]
    pub fn wire_version(self) -> i32 {
        match self {
            Self::Accepted(v) => v,
            Self::Rejected => REJECTED_VERSION,
        }
    }

    /// Decode the wire form; any non-positive version is a rejection
    #[must_use]
    pub fn from_wire(version: i32) -> Self {
        if version >= 1 {
            Self::Accepted(version)
        } else {
            Self::Rejected
        }
    }
}

/// The metadata server's state: the file info map, the configured block
/// servers, and the ring routing hashes to them.
///
/// One mutex guards the map; the ring is immutable after construction and
/// read without locking.
pub struct MetaStore {
    files: Mutex<FileInfoMap>,
    addrs: Vec<String>,
    ring: ConsistentHashRing,
}

impl MetaStore {
    /// Create a store routing blocks across the given block servers.
    ///
    /// # Panics
    /// Panics if `block_store_addrs` is empty (the embedded ring requires at
    /// least one server).
    #[must_use]
    pub fn new(block_store_addrs: Vec<String>) -> Self {
        let ring = ConsistentHashRing::new(&block_store_addrs);
        Self {
            files: Mutex::new(FileInfoMap::new()),
            addrs: block_store_addrs,
            ring,
        }
    }

    fn map(&self) -> std::sync::MutexGuard<'_, FileInfoMap> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot copy of the current file info map
    #[must_use]
    pub fn file_info_map(&self) -> FileInfoMap {
        self.map().clone()
    }

    /// Conditionally apply a metadata update.
    ///
    /// A new filename must arrive at version 1; an existing one must arrive
    /// at exactly its current version plus one. Anything else is rejected
    /// and leaves the store unchanged.
    pub fn update_file(&self, meta: FileMetaData) -> UpdateOutcome {
        let mut map = self.map();
        let accepted = match map.get(&meta.filename) {
            None => meta.version == 1,
            Some(current) => meta.version == current.version + 1,
        };
        if !accepted {
            return UpdateOutcome::Rejected;
        }
        let version = meta.version;
        map.insert(meta.filename.clone(), meta);
        UpdateOutcome::Accepted(version)
    }

    /// Group block hashes by the block server responsible for each.
    ///
    /// Every input hash lands in exactly one bucket; the bucket order within
    /// an address follows the input order.
    #[must_use]
    pub fn block_store_map(&self, hashes: &[BlockHash]) -> HashMap<String, Vec<BlockHash>> {
        let mut grouped: HashMap<String, Vec<BlockHash>> = HashMap::new();
        for hash in hashes {
            let addr = self.ring.responsible_server(hash);
            grouped.entry(addr.to_string()).or_default().push(*hash);
        }
        grouped
    }

    /// The configured block-server addresses, in configuration order
    #[must_use]
    pub fn block_store_addrs(&self) -> &[String] {
        &self.addrs
    }

    /// The embedded routing ring
    #[must_use]
    pub fn ring(&self) -> &ConsistentHashRing {
        &self.ring
    }
}
