//! Binary protocol for shardsync RPC
//!
//! Wire format (all integers are big-endian):
//!
//! Request/Response frame:
//! ```text
//! +--------+--------+------------------+
//! | type   | length | payload          |
//! | 1 byte | 4 bytes| variable         |
//! +--------+--------+------------------+
//! ```
//!
//! Composite encodings inside payloads:
//! - string: len:u16, utf8 bytes
//! - hash: 32 raw digest bytes
//! - hash list: count:u32, hashes
//! - string list: count:u32, strings
//! - file metadata: filename:string, version:i32, manifest as a string list
//!   (a deleted file's manifest is the reserved `["0"]`)
//!
//! Request types:
//! - 0x01: PutBlock (payload = block bytes)
//! - 0x02: GetBlock (hash)
//! - 0x03: HasBlocks (hash list)
//! - 0x04: GetBlockHashes (no payload)
//! - 0x05: GetFileInfoMap (no payload)
//! - 0x06: UpdateFile (file metadata)
//! - 0x07: GetBlockStoreMap (hash list)
//! - 0x08: GetBlockStoreAddrs (no payload)
//!
//! Response types:
//! - 0x10: Success (flag:u8)
//! - 0x11: Block (block bytes)
//! - 0x12: Hashes (hash list)
//! - 0x13: FileInfoMap (count:u32, file metadata entries)
//! - 0x14: Version (i32, -1 signals a rejected update)
//! - 0x15: BlockStoreMap (count:u32, then per entry: addr string + hash list)
//! - 0x16: Addrs (string list)
//! - 0x17: Error (utf8 message)

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};

use bytes::Bytes;

use crate::block::Block;
use crate::error::{CoreError, Result};
use crate::hash::BlockHash;
use crate::metadata::{FileInfoMap, FileMetaData};

/// Message type identifiers
pub mod msg {
    pub const PUT_BLOCK: u8 = 0x01;
    pub const GET_BLOCK: u8 = 0x02;
    pub const HAS_BLOCKS: u8 = 0x03;
    pub const GET_BLOCK_HASHES: u8 = 0x04;
    pub const GET_FILE_INFO_MAP: u8 = 0x05;
    pub const UPDATE_FILE: u8 = 0x06;
    pub const GET_BLOCK_STORE_MAP: u8 = 0x07;
    pub const GET_BLOCK_STORE_ADDRS: u8 = 0x08;

    pub const SUCCESS: u8 = 0x10;
    pub const BLOCK: u8 = 0x11;
    pub const HASHES: u8 = 0x12;
    pub const FILE_INFO_MAP: u8 = 0x13;
    pub const VERSION: u8 = 0x14;
    pub const BLOCK_STORE_MAP: u8 = 0x15;
    pub const ADDRS: u8 = 0x16;
    pub const ERROR: u8 = 0x17;
}

/// Upper bound on a single frame; larger frames are malformed.
const MAX_FRAME: u32 = 256 * 1024 * 1024;

/// A request to a block server or the metadata server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    PutBlock(Block),
    GetBlock(BlockHash),
    HasBlocks(Vec<BlockHash>),
    GetBlockHashes,
    GetFileInfoMap,
    UpdateFile(FileMetaData),
    GetBlockStoreMap(Vec<BlockHash>),
    GetBlockStoreAddrs,
}

/// A server's reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Success(bool),
    Block(Block),
    Hashes(Vec<BlockHash>),
    FileInfoMap(FileInfoMap),
    Version(i32),
    BlockStoreMap(HashMap<String, Vec<BlockHash>>),
    Addrs(Vec<String>),
    Error(String),
}

/// Write a frame header (type + length)
fn write_header<W: Write>(w: &mut W, msg_type: u8, len: u32) -> std::io::Result<()> {
    w.write_all(&[msg_type])?;
    w.write_all(&len.to_be_bytes())?;
    Ok(())
}

/// Read a frame header, returns (type, length)
fn read_header<R: Read>(r: &mut R) -> Result<(u8, u32)> {
    let mut type_buf = [0u8; 1];
    r.read_exact(&mut type_buf)?;

    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;

    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME {
        return Err(CoreError::Protocol(format!("frame too large: {len} bytes")));
    }
    Ok((type_buf[0], len))
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_string(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    let len = u16::try_from(bytes.len())
        .map_err(|_| CoreError::Protocol(format!("string too long for wire: {} bytes", bytes.len())))?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn put_hash(buf: &mut Vec<u8>, hash: &BlockHash) {
    buf.extend_from_slice(hash.as_bytes());
}

fn put_hash_list(buf: &mut Vec<u8>, hashes: &[BlockHash]) {
    put_u32(buf, hashes.len() as u32);
    for hash in hashes {
        put_hash(buf, hash);
    }
}

fn put_string_list(buf: &mut Vec<u8>, strings: &[String]) -> Result<()> {
    put_u32(buf, strings.len() as u32);
    for s in strings {
        put_string(buf, s)?;
    }
    Ok(())
}

fn put_file_meta(buf: &mut Vec<u8>, meta: &FileMetaData) -> Result<()> {
    put_string(buf, &meta.filename)?;
    put_i32(buf, meta.version);
    put_string_list(buf, &meta.manifest.to_wire())
}

fn get_u16(c: &mut Cursor<&[u8]>) -> Result<u16> {
    let mut buf = [0u8; 2];
    c.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

fn get_u32(c: &mut Cursor<&[u8]>) -> Result<u32> {
    let mut buf = [0u8; 4];
    c.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn get_i32(c: &mut Cursor<&[u8]>) -> Result<i32> {
    let mut buf = [0u8; 4];
    c.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

fn get_string(c: &mut Cursor<&[u8]>) -> Result<String> {
    let len = get_u16(c)? as usize;
    let mut buf = vec![0u8; len];
    c.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| CoreError::Protocol("string is not utf-8".to_string()))
}

fn get_hash(c: &mut Cursor<&[u8]>) -> Result<BlockHash> {
    let mut buf = [0u8; 32];
    c.read_exact(&mut buf)?;
    Ok(BlockHash::from_raw(buf))
}

fn get_hash_list(c: &mut Cursor<&[u8]>) -> Result<Vec<BlockHash>> {
    let count = get_u32(c)? as usize;
    let mut hashes = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        hashes.push(get_hash(c)?);
    }
    Ok(hashes)
}

fn get_string_list(c: &mut Cursor<&[u8]>) -> Result<Vec<String>> {
    let count = get_u32(c)? as usize;
    let mut strings = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        strings.push(get_string(c)?);
    }
    Ok(strings)
}

fn get_file_meta(c: &mut Cursor<&[u8]>) -> Result<FileMetaData> {
    let filename = get_string(c)?;
    let version = get_i32(c)?;
    let wire = get_string_list(c)?;
    let manifest = crate::metadata::Manifest::from_wire(&wire)?;
    Ok(FileMetaData {
        filename,
        version,
        manifest,
    })
}

/// Protocol writer for sending requests and responses
pub struct ProtocolWriter<W> {
    inner: W,
}

impl<W: Write> ProtocolWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    fn send_frame(&mut self, msg_type: u8, payload: &[u8]) -> Result<()> {
        write_header(&mut self.inner, msg_type, payload.len() as u32)?;
        self.inner.write_all(payload)?;
        self.inner.flush()?;
        Ok(())
    }

    /// Send a request frame
    ///
    /// # Errors
    /// Returns an error if encoding or the underlying write fails.
    pub fn send_request(&mut self, request: &Request) -> Result<()> {
        match request {
            Request::PutBlock(block) => self.send_frame(msg::PUT_BLOCK, &block.data),
            Request::GetBlock(hash) => {
                let mut buf = Vec::with_capacity(32);
                put_hash(&mut buf, hash);
                self.send_frame(msg::GET_BLOCK, &buf)
            }
            Request::HasBlocks(hashes) => {
                let mut buf = Vec::new();
                put_hash_list(&mut buf, hashes);
                self.send_frame(msg::HAS_BLOCKS, &buf)
            }
            Request::GetBlockHashes => self.send_frame(msg::GET_BLOCK_HASHES, &[]),
            Request::GetFileInfoMap => self.send_frame(msg::GET_FILE_INFO_MAP, &[]),
            Request::UpdateFile(meta) => {
                let mut buf = Vec::new();
                put_file_meta(&mut buf, meta)?;
                self.send_frame(msg::UPDATE_FILE, &buf)
            }
            Request::GetBlockStoreMap(hashes) => {
                let mut buf = Vec::new();
                put_hash_list(&mut buf, hashes);
                self.send_frame(msg::GET_BLOCK_STORE_MAP, &buf)
            }
            Request::GetBlockStoreAddrs => self.send_frame(msg::GET_BLOCK_STORE_ADDRS, &[]),
        }
    }

    /// Send a response frame
    ///
    /// # Errors
    /// Returns an error if encoding or the underlying write fails.
    pub fn send_response(&mut self, response: &Response) -> Result<()> {
        match response {
            Response::Success(flag) => self.send_frame(msg::SUCCESS, &[u8::from(*flag)]),
            Response::Block(block) => self.send_frame(msg::BLOCK, &block.data),
            Response::Hashes(hashes) => {
                let mut buf = Vec::new();
                put_hash_list(&mut buf, hashes);
                self.send_frame(msg::HASHES, &buf)
            }
            Response::FileInfoMap(map) => {
                let mut buf = Vec::new();
                put_u32(&mut buf, map.len() as u32);
                for meta in map.values() {
                    put_file_meta(&mut buf, meta)?;
                }
                self.send_frame(msg::FILE_INFO_MAP, &buf)
            }
            Response::Version(version) => {
                let mut buf = Vec::with_capacity(4);
                put_i32(&mut buf, *version);
                self.send_frame(msg::VERSION, &buf)
            }
            Response::BlockStoreMap(map) => {
                let mut buf = Vec::new();
                put_u32(&mut buf, map.len() as u32);
                for (addr, hashes) in map {
                    put_string(&mut buf, addr)?;
                    put_hash_list(&mut buf, hashes);
                }
                self.send_frame(msg::BLOCK_STORE_MAP, &buf)
            }
            Response::Addrs(addrs) => {
                let mut buf = Vec::new();
                put_string_list(&mut buf, addrs)?;
                self.send_frame(msg::ADDRS, &buf)
            }
            Response::Error(message) => self.send_frame(msg::ERROR, message.as_bytes()),
        }
    }

    /// Get inner writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Protocol reader for receiving requests and responses
pub struct ProtocolReader<R> {
    inner: R,
}

impl<R: Read> ProtocolReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    fn read_payload(&mut self, len: u32) -> Result<Vec<u8>> {
        let mut payload = vec![0u8; len as usize];
        self.inner.read_exact(&mut payload)?;
        Ok(payload)
    }

    /// Read the next request frame (server side)
    ///
    /// # Errors
    /// Returns an I/O error on EOF and a protocol error for unknown or
    /// malformed frames.
    pub fn read_request(&mut self) -> Result<Request> {
        let (msg_type, len) = read_header(&mut self.inner)?;
        let payload = self.read_payload(len)?;

        // Block payloads are the frame body itself; take them whole.
        if msg_type == msg::PUT_BLOCK {
            return Ok(Request::PutBlock(Block::new(Bytes::from(payload))));
        }

        let mut cursor = Cursor::new(payload.as_slice());
        match msg_type {
            msg::GET_BLOCK => Ok(Request::GetBlock(get_hash(&mut cursor)?)),
            msg::HAS_BLOCKS => Ok(Request::HasBlocks(get_hash_list(&mut cursor)?)),
            msg::GET_BLOCK_HASHES => Ok(Request::GetBlockHashes),
            msg::GET_FILE_INFO_MAP => Ok(Request::GetFileInfoMap),
            msg::UPDATE_FILE => Ok(Request::UpdateFile(get_file_meta(&mut cursor)?)),
            msg::GET_BLOCK_STORE_MAP => Ok(Request::GetBlockStoreMap(get_hash_list(&mut cursor)?)),
            msg::GET_BLOCK_STORE_ADDRS => Ok(Request::GetBlockStoreAddrs),
            other => Err(CoreError::Protocol(format!(
                "unknown request type: {other:#04x}"
            ))),
        }
    }

    /// Read the next response frame (client side)
    ///
    /// # Errors
    /// Returns an I/O error on EOF and a protocol error for unknown or
    /// malformed frames.
    pub fn read_response(&mut self) -> Result<Response> {
        let (msg_type, len) = read_header(&mut self.inner)?;
        let payload = self.read_payload(len)?;

        if msg_type == msg::BLOCK {
            return Ok(Response::Block(Block::new(Bytes::from(payload))));
        }

        let mut cursor = Cursor::new(payload.as_slice());
        match msg_type {
            msg::SUCCESS => {
                let flag = *payload.first().ok_or_else(|| {
                    CoreError::Protocol("success frame without flag".to_string())
                })?;
                Ok(Response::Success(flag != 0))
            }
            msg::HASHES => Ok(Response::Hashes(get_hash_list(&mut cursor)?)),
            msg::FILE_INFO_MAP => {
                let count = get_u32(&mut cursor)? as usize;
                let mut map = FileInfoMap::with_capacity(count.min(1024));
                for _ in 0..count {
                    let meta = get_file_meta(&mut cursor)?;
                    map.insert(meta.filename.clone(), meta);
                }
                Ok(Response::FileInfoMap(map))
            }
            msg::VERSION => Ok(Response::Version(get_i32(&mut cursor)?)),
            msg::BLOCK_STORE_MAP => {
                let count = get_u32(&mut cursor)? as usize;
                let mut map = HashMap::with_capacity(count.min(1024));
                for _ in 0..count {
                    let addr = get_string(&mut cursor)?;
                    let hashes = get_hash_list(&mut cursor)?;
                    map.insert(addr, hashes);
                }
                Ok(Response::BlockStoreMap(map))
            }
            msg::ADDRS => Ok(Response::Addrs(get_string_list(&mut cursor)?)),
            msg::ERROR => Ok(Response::Error(
                String::from_utf8_lossy(&payload).to_string(),
            )),
            other => Err(CoreError::Protocol(format!(
                "unknown response type: {other:#04x}"
            ))),
        }
    }

    /// Get inner reader
    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Manifest;

    fn roundtrip_request(request: &Request) -> Request {
        let mut buf = Vec::new();
        ProtocolWriter::new(&mut buf).send_request(request).unwrap();
        ProtocolReader::new(Cursor::new(buf)).read_request().unwrap()
    }

    fn roundtrip_response(response: &Response) -> Response {
        let mut buf = Vec::new();
        ProtocolWriter::new(&mut buf)
            .send_response(response)
            .unwrap();
        ProtocolReader::new(Cursor::new(buf))
            .read_response()
            .unwrap()
    }

    #[test]
    fn test_put_block_roundtrip() {
        let request = Request::PutBlock(Block::new(&b"block payload"[..]));
        assert_eq!(roundtrip_request(&request), request);
    }

    #[test]
    fn test_empty_block_roundtrip() {
        let request = Request::PutBlock(Block::new(Bytes::new()));
        match roundtrip_request(&request) {
            Request::PutBlock(block) => assert!(block.is_empty()),
            other => panic!("wrong message: {other:?}"),
        }
    }

    #[test]
    fn test_get_block_roundtrip() {
        let request = Request::GetBlock(BlockHash::of(b"wanted"));
        assert_eq!(roundtrip_request(&request), request);
    }

    #[test]
    fn test_has_blocks_roundtrip() {
        let request = Request::HasBlocks(vec![BlockHash::of(b"a"), BlockHash::of(b"b")]);
        assert_eq!(roundtrip_request(&request), request);
    }

    #[test]
    fn test_empty_payload_requests() {
        for request in [
            Request::GetBlockHashes,
            Request::GetFileInfoMap,
            Request::GetBlockStoreAddrs,
        ] {
            assert_eq!(roundtrip_request(&request), request);
        }
    }

    #[test]
    fn test_update_file_roundtrip() {
        let request = Request::UpdateFile(FileMetaData {
            filename: "notes.txt".to_string(),
            version: 3,
            manifest: Manifest::Live(vec![BlockHash::of(b"c1"), BlockHash::of(b"c2")]),
        });
        assert_eq!(roundtrip_request(&request), request);
    }

    #[test]
    fn test_update_file_tombstone_roundtrip() {
        let request = Request::UpdateFile(FileMetaData {
            filename: "gone.txt".to_string(),
            version: 5,
            manifest: Manifest::Deleted,
        });
        assert_eq!(roundtrip_request(&request), request);
    }

    #[test]
    fn test_file_info_map_roundtrip() {
        let mut map = FileInfoMap::new();
        map.insert(
            "a.txt".to_string(),
            FileMetaData {
                filename: "a.txt".to_string(),
                version: 1,
                manifest: Manifest::Live(vec![BlockHash::of(b"x")]),
            },
        );
        map.insert(
            "b.txt".to_string(),
            FileMetaData {
                filename: "b.txt".to_string(),
                version: 9,
                manifest: Manifest::Deleted,
            },
        );
        let response = Response::FileInfoMap(map);
        assert_eq!(roundtrip_response(&response), response);
    }

    #[test]
    fn test_version_and_success_roundtrip() {
        assert_eq!(
            roundtrip_response(&Response::Version(-1)),
            Response::Version(-1)
        );
        assert_eq!(
            roundtrip_response(&Response::Success(true)),
            Response::Success(true)
        );
    }

    #[test]
    fn test_block_store_map_roundtrip() {
        let mut map = HashMap::new();
        map.insert("s1:80".to_string(), vec![BlockHash::of(b"1")]);
        map.insert(
            "s2:80".to_string(),
            vec![BlockHash::of(b"2"), BlockHash::of(b"3")],
        );
        let response = Response::BlockStoreMap(map);
        assert_eq!(roundtrip_response(&response), response);
    }

    #[test]
    fn test_addrs_roundtrip() {
        let response = Response::Addrs(vec!["s1:80".to_string(), "s2:80".to_string()]);
        assert_eq!(roundtrip_response(&response), response);
    }

    #[test]
    fn test_error_roundtrip() {
        let response = Response::Error("block not found".to_string());
        assert_eq!(roundtrip_response(&response), response);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut buf = Vec::new();
        write_header(&mut buf, 0x7f, 0).unwrap();
        let result = ProtocolReader::new(Cursor::new(buf)).read_request();
        assert!(matches!(result, Err(CoreError::Protocol(_))));
    }

    #[test]
    fn test_truncated_frame_is_an_error() {
        let mut buf = Vec::new();
        ProtocolWriter::new(&mut buf)
            .send_request(&Request::GetBlock(BlockHash::of(b"h")))
            .unwrap();
        buf.truncate(buf.len() - 5);
        assert!(ProtocolReader::new(Cursor::new(buf)).read_request().is_err());
    }
}
