//! shardsync-server: TCP request loops for the block and metadata stores
//!
//! Each accepted connection gets its own thread that reads framed requests
//! and answers them against the shared store. The stores serialize access
//! internally; no handler holds a lock across I/O.

use std::io::{BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use color_eyre::Result;
use tracing::{debug, info, warn};

use shardsync_core::{BlockStore, MetaStore, ProtocolReader, ProtocolWriter, Request, Response};

/// Accept connections forever, serving block-store requests.
///
/// # Errors
/// Returns an error only if accepting itself becomes impossible; individual
/// connection failures are logged and survived.
pub fn serve_block_store(listener: TcpListener, store: Arc<BlockStore>) -> Result<()> {
    info!("block server listening on {}", listener.local_addr()?);
    for conn in listener.incoming() {
        match conn {
            Ok(stream) => {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    if let Err(e) = serve_conn(stream, |req| handle_block_request(&store, req)) {
                        debug!("block connection ended: {e}");
                    }
                });
            }
            Err(e) => warn!("accept failed: {e}"),
        }
    }
    Ok(())
}

/// Accept connections forever, serving metadata requests.
///
/// # Errors
/// Returns an error only if accepting itself becomes impossible; individual
/// connection failures are logged and survived.
pub fn serve_meta_store(listener: TcpListener, store: Arc<MetaStore>) -> Result<()> {
    info!("metadata server listening on {}", listener.local_addr()?);
    for conn in listener.incoming() {
        match conn {
            Ok(stream) => {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    if let Err(e) = serve_conn(stream, |req| handle_meta_request(&store, req)) {
                        debug!("meta connection ended: {e}");
                    }
                });
            }
            Err(e) => warn!("accept failed: {e}"),
        }
    }
    Ok(())
}

/// Request/response loop for one connection. Returns when the peer hangs up.
fn serve_conn(stream: TcpStream, mut handle: impl FnMut(Request) -> Response) -> Result<()> {
    let peer = stream.peer_addr()?;
    debug!("client connected: {peer}");

    let mut reader = ProtocolReader::new(BufReader::new(stream.try_clone()?));
    let mut writer = ProtocolWriter::new(BufWriter::new(stream));

    loop {
        let request = match reader.read_request() {
            Ok(request) => request,
            Err(e) => {
                // EOF when the client closes between calls; anything else is
                // a malformed frame and also ends the connection.
                debug!("stopping reads from {peer}: {e}");
                break;
            }
        };
        writer.send_response(&handle(request))?;
    }
    Ok(())
}

/// Answer one request against the block store.
pub fn handle_block_request(store: &BlockStore, request: Request) -> Response {
    match request {
        Request::PutBlock(block) => Response::Success(store.put(block)),
        Request::GetBlock(hash) => match store.get(&hash) {
            Ok(block) => Response::Block(block),
            Err(e) => Response::Error(e.to_string()),
        },
        Request::HasBlocks(hashes) => Response::Hashes(store.has(&hashes)),
        Request::GetBlockHashes => Response::Hashes(store.hashes()),
        other => Response::Error(format!("not a block-store request: {other:?}")),
    }
}

/// Answer one request against the metadata store.
pub fn handle_meta_request(store: &MetaStore, request: Request) -> Response {
    match request {
        Request::GetFileInfoMap => Response::FileInfoMap(store.file_info_map()),
        Request::UpdateFile(meta) => Response::Version(store.update_file(meta).wire_version()),
        Request::GetBlockStoreMap(hashes) => {
            Response::BlockStoreMap(store.block_store_map(&hashes))
        }
        Request::GetBlockStoreAddrs => Response::Addrs(store.block_store_addrs().to_vec()),
        other => Response::Error(format!("not a metadata request: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardsync_core::{Block, BlockHash, FileMetaData, Manifest};

    #[test]
    fn test_block_dispatch() {
        let store = BlockStore::new();
        let block = Block::new(&b"payload"[..]);
        let hash = block.hash();

        let resp = handle_block_request(&store, Request::PutBlock(block.clone()));
        assert_eq!(resp, Response::Success(true));

        let resp = handle_block_request(&store, Request::GetBlock(hash));
        assert_eq!(resp, Response::Block(block));

        let resp = handle_block_request(&store, Request::GetBlock(BlockHash::of(b"missing")));
        assert!(matches!(resp, Response::Error(_)));
    }

    #[test]
    fn test_block_store_rejects_meta_requests() {
        let store = BlockStore::new();
        let resp = handle_block_request(&store, Request::GetFileInfoMap);
        assert!(matches!(resp, Response::Error(_)));
    }

    #[test]
    fn test_meta_dispatch() {
        let store = MetaStore::new(vec!["s1:80".to_string()]);
        let meta = FileMetaData {
            filename: "f.txt".to_string(),
            version: 1,
            manifest: Manifest::Live(vec![BlockHash::of(b"x")]),
        };

        let resp = handle_meta_request(&store, Request::UpdateFile(meta.clone()));
        assert_eq!(resp, Response::Version(1));

        // Stale version comes back as the in-band -1, not an error.
        let resp = handle_meta_request(&store, Request::UpdateFile(meta));
        assert_eq!(resp, Response::Version(-1));

        let resp = handle_meta_request(&store, Request::GetBlockStoreAddrs);
        assert_eq!(resp, Response::Addrs(vec!["s1:80".to_string()]));
    }

    #[test]
    fn test_meta_store_rejects_block_requests() {
        let store = MetaStore::new(vec!["s1:80".to_string()]);
        let resp = handle_meta_request(&store, Request::GetBlockHashes);
        assert!(matches!(resp, Response::Error(_)));
    }
}
