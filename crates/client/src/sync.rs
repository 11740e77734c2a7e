//! The client reconciliation loop.
//!
//! One invocation performs one sync cycle over a flat base directory:
//! scan local files into block-hash manifests, merge against the persisted
//! index, publish local changes (blocks first, then metadata), adopt remote
//! changes, and rewrite the index. Last writer wins at file granularity; a
//! client whose update is rejected adopts the remote state in the same
//! cycle.
//!
//! Concurrent cycles over the same base directory are not supported.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::Result;
use color_eyre::eyre::bail;
use tracing::{debug, info, warn};

use shardsync_core::config::CONFIG_FILE;
use shardsync_core::index::{INDEX_FILE, INDEX_TMP_FILE};
use shardsync_core::{
    Block, BlockHash, ConsistentHashRing, FileInfoMap, FileMetaData, Manifest, UpdateOutcome,
    chunk, index,
};

use crate::{BlockStoreApi, BlockStoreConnector, MetaStoreApi};

/// Inputs for one sync cycle
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Directory being synchronized
    pub base_dir: PathBuf,
    /// Chunk size in bytes
    pub block_size: usize,
}

/// What a cycle did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Files whose metadata update was accepted
    pub pushed: usize,
    /// Files downloaded from the remote
    pub pulled: usize,
    /// Local files removed because the remote tombstoned them
    pub removed: usize,
    /// Files skipped after a per-file error; retried next cycle
    pub skipped: usize,
}

impl SyncReport {
    /// Whether the cycle changed nothing on either side
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.pushed == 0 && self.pulled == 0 && self.removed == 0 && self.skipped == 0
    }
}

/// File names the scanner never treats as payload.
fn is_reserved(name: &str) -> bool {
    name == INDEX_FILE || name == INDEX_TMP_FILE || name == CONFIG_FILE
}

/// Run one reconciliation cycle against the metadata server.
///
/// Per-file failures are logged and counted in the report; the cycle keeps
/// going and the next invocation retries them.
///
/// # Errors
/// Returns an error for cycle-level failures: an unreadable base directory,
/// a broken index file, or an unreachable metadata server.
pub fn sync_cycle<M, C>(opts: &SyncOptions, meta: &mut M, connector: &C) -> Result<SyncReport>
where
    M: MetaStoreApi,
    C: BlockStoreConnector,
{
    if opts.block_size == 0 {
        bail!("block size must be positive");
    }

    // Phase 1: hash what's on disk.
    let (scanned, unreadable) = scan_base_dir(&opts.base_dir, opts.block_size)?;
    debug!(
        "scanned {} files under {}",
        scanned.len(),
        opts.base_dir.display()
    );

    // Phases 2-3: fold the scan into the persisted index.
    let mut local_index = index::load(&opts.base_dir)?;
    merge_scan(&mut local_index, &scanned, &unreadable);

    // Phase 4: remote state, and one ring for the whole cycle.
    let mut remote_index = meta.file_info_map()?;
    let addrs = meta.block_store_addrs()?;
    if addrs.is_empty() {
        bail!("metadata server reports no block servers");
    }
    let ring = ConsistentHashRing::new(&addrs);
    let mut sessions: HashMap<String, C::Session> = HashMap::new();
    let mut report = SyncReport::default();
    let mut any_rejected = false;

    // Phase 5: publish local changes, blocks before metadata.
    let mut local_names: Vec<String> = local_index.keys().cloned().collect();
    local_names.sort_unstable();
    for name in &local_names {
        let Some(local) = local_index.get(name).cloned() else {
            continue;
        };
        let should_push = remote_index
            .get(name)
            .is_none_or(|r| r.version < local.version);
        if !should_push {
            continue;
        }

        match push_file(opts, &ring, connector, &mut sessions, meta, &local) {
            Ok(UpdateOutcome::Accepted(version)) => {
                if let Some(entry) = local_index.get_mut(name) {
                    entry.version = version;
                }
                info!("pushed {name} at version {version}");
                report.pushed += 1;
            }
            Ok(UpdateOutcome::Rejected) => {
                // Remote advanced since we read it; phase 6 adopts its state.
                warn!("update of {name} rejected, reconciling from remote");
                any_rejected = true;
            }
            Err(e) => {
                warn!("skipping push of {name}: {e}");
                report.skipped += 1;
            }
        }
    }

    // A rejection means the snapshot from phase 4 is stale; re-read it so
    // the losing files reconcile in this cycle, not the next one.
    if any_rejected {
        remote_index = meta.file_info_map()?;
    }

    // Phase 6: adopt remote changes, including our own rejected pushes.
    let mut remote_names: Vec<&String> = remote_index.keys().collect();
    remote_names.sort_unstable();
    for name in remote_names {
        let remote_meta = &remote_index[name];
        let should_pull = match local_index.get(name) {
            None => true,
            Some(l) => {
                l.version < remote_meta.version
                    || (l.version == remote_meta.version && l.manifest != remote_meta.manifest)
            }
        };
        if !should_pull {
            continue;
        }

        match pull_file(opts, &ring, connector, &mut sessions, remote_meta) {
            Ok(()) => {
                local_index.insert(name.clone(), remote_meta.clone());
                if remote_meta.manifest.is_deleted() {
                    info!("removed {name}, deleted remotely");
                    report.removed += 1;
                } else {
                    info!("pulled {name} at version {}", remote_meta.version);
                    report.pulled += 1;
                }
            }
            Err(e) => {
                warn!("skipping pull of {name}: {e}");
                report.skipped += 1;
            }
        }
    }

    // Phase 7: persist what we now believe.
    index::save(&opts.base_dir, &local_index)?;
    Ok(report)
}

/// Hash every regular file in the base directory (flat; subdirectories are
/// not synchronized). Returns the manifests plus the set of files that
/// could not be read, which must not be mistaken for deletions.
fn scan_base_dir(
    base_dir: &Path,
    block_size: usize,
) -> Result<(BTreeMap<String, Vec<BlockHash>>, HashSet<String>)> {
    let mut scanned = BTreeMap::new();
    let mut unreadable = HashSet::new();

    for entry in fs::read_dir(base_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                warn!("skipping non-utf8 file name: {raw:?}");
                continue;
            }
        };
        if is_reserved(&name) {
            continue;
        }
        match fs::read(entry.path()) {
            Ok(data) => {
                scanned.insert(name, chunk::hashes(&data, block_size));
            }
            Err(e) => {
                warn!("cannot read {name}: {e}");
                unreadable.insert(name);
            }
        }
    }

    Ok((scanned, unreadable))
}

/// Phases 2 and 3: fold the scan into the index, bumping versions for
/// changed manifests and tombstoning files that left the disk.
fn merge_scan(
    local_index: &mut FileInfoMap,
    scanned: &BTreeMap<String, Vec<BlockHash>>,
    unreadable: &HashSet<String>,
) {
    for (name, hashes) in scanned {
        match local_index.get_mut(name) {
            Some(entry) => {
                let manifest = Manifest::Live(hashes.clone());
                if entry.manifest != manifest {
                    entry.manifest = manifest;
                    entry.version += 1;
                }
            }
            None => {
                local_index.insert(
                    name.clone(),
                    FileMetaData {
                        filename: name.clone(),
                        version: 1,
                        manifest: Manifest::Live(hashes.clone()),
                    },
                );
            }
        }
    }

    for (name, entry) in local_index.iter_mut() {
        if !scanned.contains_key(name)
            && !unreadable.contains(name)
            && !entry.manifest.is_deleted()
        {
            entry.version += 1;
            entry.manifest = Manifest::Deleted;
        }
    }
}

/// Reuse one session per shard for the whole cycle.
fn shard_session<'s, C: BlockStoreConnector>(
    sessions: &'s mut HashMap<String, C::Session>,
    connector: &C,
    addr: &str,
) -> Result<&'s mut C::Session> {
    match sessions.entry(addr.to_string()) {
        Entry::Occupied(occupied) => Ok(occupied.into_mut()),
        Entry::Vacant(vacant) => Ok(vacant.insert(connector.connect(addr)?)),
    }
}

/// Upload a file's blocks to their shards, then propose the metadata
/// update. Blocks always land before the manifest that references them.
fn push_file<M, C>(
    opts: &SyncOptions,
    ring: &ConsistentHashRing,
    connector: &C,
    sessions: &mut HashMap<String, C::Session>,
    meta: &mut M,
    local: &FileMetaData,
) -> Result<UpdateOutcome>
where
    M: MetaStoreApi,
    C: BlockStoreConnector,
{
    if !local.manifest.is_deleted() {
        let path = opts.base_dir.join(&local.filename);
        if path.is_file() {
            let data = fs::read(&path)?;
            let blocks = chunk::split(&data, opts.block_size);
            upload_blocks(ring, connector, sessions, blocks)?;
        }
        // A file that vanished between scan and push still publishes its
        // manifest; the next cycle records the deletion.
    }
    meta.update_file(local)
}

/// Group blocks by responsible shard and upload the ones each shard is
/// missing.
fn upload_blocks<C: BlockStoreConnector>(
    ring: &ConsistentHashRing,
    connector: &C,
    sessions: &mut HashMap<String, C::Session>,
    blocks: Vec<Block>,
) -> Result<()> {
    let mut by_addr: HashMap<String, Vec<Block>> = HashMap::new();
    for block in blocks {
        let addr = ring.responsible_server(&block.hash());
        by_addr.entry(addr.to_string()).or_default().push(block);
    }

    for (addr, blocks) in by_addr {
        let session = shard_session(sessions, connector, &addr)?;
        let hashes: Vec<BlockHash> = blocks.iter().map(Block::hash).collect();
        let resident: HashSet<BlockHash> = session.has_blocks(&hashes)?.into_iter().collect();
        for block in blocks {
            if !resident.contains(&block.hash()) {
                session.put_block(&block)?;
            }
        }
    }
    Ok(())
}

/// Materialize one remote entry locally: delete the file for a tombstone,
/// otherwise fetch its blocks in manifest order and rewrite the file.
fn pull_file<C: BlockStoreConnector>(
    opts: &SyncOptions,
    ring: &ConsistentHashRing,
    connector: &C,
    sessions: &mut HashMap<String, C::Session>,
    remote_meta: &FileMetaData,
) -> Result<()> {
    let path = opts.base_dir.join(&remote_meta.filename);
    match &remote_meta.manifest {
        Manifest::Deleted => {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Manifest::Live(hashes) => {
            let mut data = Vec::new();
            for hash in hashes {
                let addr = ring.responsible_server(hash);
                let session = shard_session(sessions, connector, addr)?;
                let block = session.get_block(hash)?;
                if block.hash() != *hash {
                    bail!("block {hash} from {addr} failed integrity check");
                }
                data.extend_from_slice(&block.data);
            }
            fs::write(&path, &data)?;
        }
    }
    Ok(())
}
