//! shardsync-core: Core types and state machines
//!
//! Provides content-addressed blocks, versioned file metadata, consistent
//! hash routing, fixed-size chunking, the framed wire protocol, and the
//! client's persisted index.

pub mod block;
pub mod chunk;
pub mod config;
pub mod error;
pub mod hash;
pub mod index;
pub mod metadata;
pub mod protocol;
pub mod ring;

pub use block::{Block, BlockStore};
pub use config::SyncConfig;
pub use error::{CoreError, Result};
pub use hash::BlockHash;
pub use index::INDEX_FILE;
pub use metadata::{FileInfoMap, FileMetaData, Manifest, MetaStore, UpdateOutcome};
pub use protocol::{ProtocolReader, ProtocolWriter, Request, Response};
pub use ring::ConsistentHashRing;
