//! TCP sessions against shardsync servers.
//!
//! One connection per server per sync cycle; calls are strictly
//! request/response over the framed protocol, with per-call read and write
//! timeouts so a stalled server cannot hang a sync.

use std::collections::HashMap;
use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::{bail, eyre};
use shardsync_core::{
    Block, BlockHash, FileInfoMap, FileMetaData, ProtocolReader, ProtocolWriter, Request, Response,
    UpdateOutcome,
};

use crate::{BlockStoreApi, BlockStoreConnector, MetaStoreApi};

/// A framed request/response channel over one TCP connection
struct Channel {
    reader: ProtocolReader<BufReader<TcpStream>>,
    writer: ProtocolWriter<BufWriter<TcpStream>>,
    addr: String,
}

impl Channel {
    fn open(addr: &str, timeout: Duration) -> Result<Self> {
        let sock_addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| eyre!("cannot resolve address: {addr}"))?;

        let stream = TcpStream::connect_timeout(&sock_addr, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        let reader = ProtocolReader::new(BufReader::new(stream.try_clone()?));
        let writer = ProtocolWriter::new(BufWriter::new(stream));
        Ok(Self {
            reader,
            writer,
            addr: addr.to_string(),
        })
    }

    /// One request/response exchange; a server-reported error becomes `Err`.
    fn call(&mut self, request: &Request) -> Result<Response> {
        self.writer.send_request(request)?;
        match self.reader.read_response()? {
            Response::Error(message) => bail!("{}: {message}", self.addr),
            response => Ok(response),
        }
    }
}

/// Session against one block server
pub struct RemoteBlockStore {
    channel: Channel,
}

impl RemoteBlockStore {
    /// Connect to a block server.
    ///
    /// # Errors
    /// Returns an error if the address cannot be resolved or connected
    /// within the timeout.
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            channel: Channel::open(addr, timeout)?,
        })
    }
}

impl BlockStoreApi for RemoteBlockStore {
    fn put_block(&mut self, block: &Block) -> Result<bool> {
        match self.channel.call(&Request::PutBlock(block.clone()))? {
            Response::Success(flag) => Ok(flag),
            other => bail!("unexpected response to PutBlock: {other:?}"),
        }
    }

    fn get_block(&mut self, hash: &BlockHash) -> Result<Block> {
        match self.channel.call(&Request::GetBlock(*hash))? {
            Response::Block(block) => Ok(block),
            other => bail!("unexpected response to GetBlock: {other:?}"),
        }
    }

    fn has_blocks(&mut self, hashes: &[BlockHash]) -> Result<Vec<BlockHash>> {
        match self.channel.call(&Request::HasBlocks(hashes.to_vec()))? {
            Response::Hashes(hashes) => Ok(hashes),
            other => bail!("unexpected response to HasBlocks: {other:?}"),
        }
    }

    fn block_hashes(&mut self) -> Result<Vec<BlockHash>> {
        match self.channel.call(&Request::GetBlockHashes)? {
            Response::Hashes(hashes) => Ok(hashes),
            other => bail!("unexpected response to GetBlockHashes: {other:?}"),
        }
    }
}

/// Session against the metadata server
pub struct RemoteMetaStore {
    channel: Channel,
}

impl RemoteMetaStore {
    /// Connect to the metadata server.
    ///
    /// # Errors
    /// Returns an error if the address cannot be resolved or connected
    /// within the timeout.
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            channel: Channel::open(addr, timeout)?,
        })
    }
}

impl MetaStoreApi for RemoteMetaStore {
    fn file_info_map(&mut self) -> Result<FileInfoMap> {
        match self.channel.call(&Request::GetFileInfoMap)? {
            Response::FileInfoMap(map) => Ok(map),
            other => bail!("unexpected response to GetFileInfoMap: {other:?}"),
        }
    }

    fn update_file(&mut self, meta: &FileMetaData) -> Result<UpdateOutcome> {
        match self.channel.call(&Request::UpdateFile(meta.clone()))? {
            Response::Version(version) => Ok(UpdateOutcome::from_wire(version)),
            other => bail!("unexpected response to UpdateFile: {other:?}"),
        }
    }

    fn block_store_map(
        &mut self,
        hashes: &[BlockHash],
    ) -> Result<HashMap<String, Vec<BlockHash>>> {
        match self
            .channel
            .call(&Request::GetBlockStoreMap(hashes.to_vec()))?
        {
            Response::BlockStoreMap(map) => Ok(map),
            other => bail!("unexpected response to GetBlockStoreMap: {other:?}"),
        }
    }

    fn block_store_addrs(&mut self) -> Result<Vec<String>> {
        match self.channel.call(&Request::GetBlockStoreAddrs)? {
            Response::Addrs(addrs) => Ok(addrs),
            other => bail!("unexpected response to GetBlockStoreAddrs: {other:?}"),
        }
    }
}

/// Connector opening TCP block-store sessions with a fixed timeout
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    /// Per-call timeout applied to connect, read, and write
    pub timeout: Duration,
}

impl BlockStoreConnector for TcpConnector {
    type Session = RemoteBlockStore;

    fn connect(&self, addr: &str) -> Result<Self::Session> {
        RemoteBlockStore::connect(addr, self.timeout)
    }
}
