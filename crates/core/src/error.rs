//! Error types for shardsync operations.

use thiserror::Error;

use crate::hash::BlockHash;

/// Errors produced by the core stores, codec, and index.
///
/// A rejected metadata update is deliberately *not* represented here; it is
/// an in-band outcome ([`crate::metadata::UpdateOutcome::Rejected`]).
#[derive(Error, Debug)]
pub enum CoreError {
    /// I/O error during read/write operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A block was requested that the store does not hold.
    #[error("block not found: {0}")]
    BlockNotFound(BlockHash),

    /// A string that should have been a 64-char hex SHA-256 digest wasn't.
    #[error("invalid block hash: {0:?}")]
    InvalidHash(String),

    /// Malformed frame or message on the wire.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The local index file exists but could not be decoded.
    #[error("index store error: {0}")]
    Index(String),

    /// The optional config file exists but could not be parsed.
    #[error("config error: {0}")]
    Config(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
