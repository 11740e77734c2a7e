//! In-process backends for testing
//!
//! This module provides a `LocalCluster` that serves block and metadata
//! operations directly from in-memory stores, without TCP. Useful for
//! exercising the sync engine, and for asserting how many write RPCs a
//! cycle issued.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use color_eyre::Result;
use color_eyre::eyre::bail;
use shardsync_core::{
    Block, BlockHash, BlockStore, FileInfoMap, FileMetaData, MetaStore, UpdateOutcome,
};

use crate::{BlockStoreApi, BlockStoreConnector, MetaStoreApi};

/// A set of in-memory block stores plus one metadata store, addressable by
/// the fake addresses given at construction.
pub struct LocalCluster {
    blocks: HashMap<String, Arc<BlockStore>>,
    meta: Arc<MetaStore>,
    put_calls: Arc<AtomicUsize>,
    update_calls: Arc<AtomicUsize>,
}

impl LocalCluster {
    /// Build a cluster with one block store per address.
    #[must_use]
    pub fn new(addrs: &[&str]) -> Self {
        let owned: Vec<String> = addrs.iter().map(|a| (*a).to_string()).collect();
        let blocks = owned
            .iter()
            .map(|a| (a.clone(), Arc::new(BlockStore::new())))
            .collect();
        Self {
            blocks,
            meta: Arc::new(MetaStore::new(owned)),
            put_calls: Arc::new(AtomicUsize::new(0)),
            update_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Open a session against the metadata store
    #[must_use]
    pub fn meta_session(&self) -> LocalMetaStore {
        LocalMetaStore {
            store: Arc::clone(&self.meta),
            update_calls: Arc::clone(&self.update_calls),
        }
    }

    /// Direct handle to one shard's store, for assertions
    #[must_use]
    pub fn block_store(&self, addr: &str) -> Option<&Arc<BlockStore>> {
        self.blocks.get(addr)
    }

    /// Direct handle to the metadata store, for assertions
    #[must_use]
    pub fn meta_store(&self) -> &MetaStore {
        &self.meta
    }

    /// Total blocks resident across all shards
    #[must_use]
    pub fn total_blocks(&self) -> usize {
        self.blocks.values().map(|s| s.len()).sum()
    }

    /// Number of write RPCs (PutBlock + UpdateFile) served so far
    #[must_use]
    pub fn write_rpc_count(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst) + self.update_calls.load(Ordering::SeqCst)
    }
}

impl BlockStoreConnector for LocalCluster {
    type Session = LocalBlockStore;

    fn connect(&self, addr: &str) -> Result<Self::Session> {
        let Some(store) = self.blocks.get(addr) else {
            bail!("connection refused: no block store at {addr}");
        };
        Ok(LocalBlockStore {
            store: Arc::clone(store),
            put_calls: Arc::clone(&self.put_calls),
        })
    }
}

/// In-process session against one block store
pub struct LocalBlockStore {
    store: Arc<BlockStore>,
    put_calls: Arc<AtomicUsize>,
}

impl BlockStoreApi for LocalBlockStore {
    fn put_block(&mut self, block: &Block) -> Result<bool> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.store.put(block.clone()))
    }

    fn get_block(&mut self, hash: &BlockHash) -> Result<Block> {
        Ok(self.store.get(hash)?)
    }

    fn has_blocks(&mut self, hashes: &[BlockHash]) -> Result<Vec<BlockHash>> {
        Ok(self.store.has(hashes))
    }

    fn block_hashes(&mut self) -> Result<Vec<BlockHash>> {
        Ok(self.store.hashes())
    }
}

/// In-process session against the metadata store
pub struct LocalMetaStore {
    store: Arc<MetaStore>,
    update_calls: Arc<AtomicUsize>,
}

impl MetaStoreApi for LocalMetaStore {
    fn file_info_map(&mut self) -> Result<FileInfoMap> {
        Ok(self.store.file_info_map())
    }

    fn update_file(&mut self, meta: &FileMetaData) -> Result<UpdateOutcome> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.store.update_file(meta.clone()))
    }

    fn block_store_map(
        &mut self,
        hashes: &[BlockHash],
    ) -> Result<HashMap<String, Vec<BlockHash>>> {
        Ok(self.store.block_store_map(hashes))
    }

    fn block_store_addrs(&mut self) -> Result<Vec<String>> {
        Ok(self.store.block_store_addrs().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_routes_by_address() {
        let cluster = LocalCluster::new(&["s1:80", "s2:80"]);
        let mut session = cluster.connect("s1:80").unwrap();

        let block = Block::new(&b"chunk"[..]);
        let hash = block.hash();
        session.put_block(&block).unwrap();

        assert!(cluster.block_store("s1:80").unwrap().get(&hash).is_ok());
        assert!(cluster.block_store("s2:80").unwrap().get(&hash).is_err());
    }

    #[test]
    fn test_unknown_address_refused() {
        let cluster = LocalCluster::new(&["s1:80"]);
        assert!(cluster.connect("nowhere:1").is_err());
    }

    #[test]
    fn test_write_rpc_counter() {
        let cluster = LocalCluster::new(&["s1:80"]);
        assert_eq!(cluster.write_rpc_count(), 0);

        let mut session = cluster.connect("s1:80").unwrap();
        session.put_block(&Block::new(&b"x"[..])).unwrap();

        let mut meta = cluster.meta_session();
        meta.update_file(&FileMetaData {
            filename: "f".to_string(),
            version: 1,
            manifest: shardsync_core::Manifest::Live(vec![BlockHash::of(b"x")]),
        })
        .unwrap();

        assert_eq!(cluster.write_rpc_count(), 2);
    }
}
