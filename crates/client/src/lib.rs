//! shardsync-client: RPC sessions and the sync engine
//!
//! Defines the session traits the sync engine runs against, the TCP
//! implementations used in production, and in-process backends for tests.

use std::collections::HashMap;

use color_eyre::Result;
use shardsync_core::{Block, BlockHash, FileInfoMap, FileMetaData, UpdateOutcome};

pub mod local;
pub mod remote;
pub mod sync;

pub use remote::{RemoteBlockStore, RemoteMetaStore, TcpConnector};
pub use sync::{SyncOptions, SyncReport, sync_cycle};

/// Operations against a single block server.
///
/// This trait allows swapping the real TCP session with an in-process
/// implementation for testing.
pub trait BlockStoreApi {
    /// Store a block under the hash of its payload
    fn put_block(&mut self, block: &Block) -> Result<bool>;

    /// Fetch a block by hash
    fn get_block(&mut self, hash: &BlockHash) -> Result<Block>;

    /// Which of `hashes` the server already holds
    fn has_blocks(&mut self, hashes: &[BlockHash]) -> Result<Vec<BlockHash>>;

    /// All hashes resident on the server
    fn block_hashes(&mut self) -> Result<Vec<BlockHash>>;
}

/// Operations against the metadata server.
pub trait MetaStoreApi {
    /// Snapshot of the remote file info map
    fn file_info_map(&mut self) -> Result<FileInfoMap>;

    /// Propose a metadata update; rejection is an in-band outcome
    fn update_file(&mut self, meta: &FileMetaData) -> Result<UpdateOutcome>;

    /// Group hashes by the block server responsible for each
    fn block_store_map(
        &mut self,
        hashes: &[BlockHash],
    ) -> Result<HashMap<String, Vec<BlockHash>>>;

    /// The configured block-server addresses
    fn block_store_addrs(&mut self) -> Result<Vec<String>>;
}

/// Opens block-server sessions by address.
///
/// The sync engine asks for at most one session per address per cycle; tests
/// provide a connector backed by in-process stores.
pub trait BlockStoreConnector {
    type Session: BlockStoreApi;

    /// Open a session to the block server at `addr`
    fn connect(&self, addr: &str) -> Result<Self::Session>;
}
