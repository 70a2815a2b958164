//! Three-phase sync reconciliation
//!
//! One cycle drives the base directory, the persisted local index, and the
//! remote snapshot toward agreement:
//!
//! 1. Refresh the index from disk: bump versions where content changed or
//!    disappeared.
//! 2. Merge against the remote snapshot. The store's accept order is
//!    authoritative: a remote record at the same version with different
//!    content wins, because the store would reject the local bump anyway.
//! 3. Push records the remote has never seen.
//! 4. Persist the index.
//!
//! Atomicity is per file; a cycle that dies mid-way leaves the index stale
//! and the next cycle re-derives state.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{eyre, Result};
use tracing::{debug, info, warn};

use tidesync_core::{
    chunker, load_index, save_index, BlockHash, FileInfoMap, FileMetaData, HashList, Scanner,
    REJECTED_VERSION,
};

use crate::{BlockStoreApi, MetaStoreApi};

/// Parameters for one sync cycle
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub base_dir: PathBuf,
    /// Block size in bytes; every client of a namespace must agree on it
    pub block_size: usize,
    /// Extra scanner ignore patterns
    pub ignore: Vec<String>,
}

/// Outcome counters for one sync cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Files whose blocks and record were pushed
    pub uploaded: usize,
    /// Files fetched from the block store and written locally
    pub downloaded: usize,
    /// Local files removed because the remote record is a tombstone
    pub deleted: usize,
    /// Local deletions pushed as tombstone records
    pub tombstones_pushed: usize,
    /// Version races resolved by yielding to the remote record
    pub conflicts: usize,
    /// Files already in agreement
    pub unchanged: usize,
}

impl SyncReport {
    /// Total files that changed on either side
    #[must_use]
    pub fn total_changed(&self) -> usize {
        self.uploaded + self.downloaded + self.deleted + self.tombstones_pushed + self.conflicts
    }
}

/// Run one sync cycle against the given services.
///
/// # Errors
/// Returns an error on local I/O failure, transport failure, or a missing
/// block (server-side inconsistency). A rejected `update_file` is not an
/// error; it triggers the remote-wins recovery path.
pub fn sync_cycle(
    opts: &SyncOptions,
    meta: &mut impl MetaStoreApi,
    blocks: &mut impl BlockStoreApi,
) -> Result<SyncReport> {
    let mut index = load_index(&opts.base_dir)?;
    refresh_local_index(opts, &mut index)?;

    let remote = meta.get_file_info_map()?;
    debug!(
        "merging {} local against {} remote records",
        index.len(),
        remote.len()
    );

    let mut report = SyncReport::default();

    // Records the remote knows about
    for (name, theirs) in &remote {
        let ours = index.get(name).cloned();
        match ours {
            None => {
                adopt_remote(opts, blocks, &mut index, theirs, &mut report)?;
            }
            Some(ours) if theirs.version > ours.version => {
                adopt_remote(opts, blocks, &mut index, theirs, &mut report)?;
            }
            Some(ours) if theirs.version == ours.version => {
                if theirs.hash_list == ours.hash_list {
                    report.unchanged += 1;
                } else {
                    // Both sides raced to this version. The store already
                    // accepted theirs, so the local bump must yield.
                    report.conflicts += 1;
                    adopt_remote(opts, blocks, &mut index, theirs, &mut report)?;
                }
            }
            Some(ours) => {
                propose_upload(opts, meta, blocks, &mut index, ours, &mut report)?;
            }
        }
    }

    // Records the remote has never seen
    let local_only: Vec<FileMetaData> = index
        .values()
        .filter(|m| !remote.contains_key(&m.filename))
        .cloned()
        .collect();
    for ours in local_only {
        propose_upload(opts, meta, blocks, &mut index, ours, &mut report)?;
    }

    save_index(&opts.base_dir, &index)?;
    Ok(report)
}

/// Phase 1: make the index reflect what the file system shows, bumping
/// versions above the previous claim where content changed or disappeared
fn refresh_local_index(opts: &SyncOptions, index: &mut FileInfoMap) -> Result<()> {
    let mut scanner = Scanner::new(&opts.base_dir);
    for pattern in &opts.ignore {
        scanner = scanner.ignore(pattern);
    }
    let present = scanner.scan()?;

    for name in &present {
        let hashes = chunker::file_hash_list(&opts.base_dir.join(name), opts.block_size)?;
        let hash_list = HashList::Blocks(hashes);

        match index.get_mut(name) {
            Some(entry) => {
                if entry.hash_list != hash_list {
                    entry.version += 1;
                    entry.hash_list = hash_list;
                }
            }
            None => {
                index.insert(name.clone(), FileMetaData::new(name.clone(), 1, hash_list));
            }
        }
    }

    // Files the index claims but the disk no longer shows become
    // tombstones; an existing tombstone is left alone.
    let present: HashSet<String> = present.into_iter().collect();
    for entry in index.values_mut() {
        if !present.contains(&entry.filename) && !entry.hash_list.is_tombstone() {
            entry.version += 1;
            entry.hash_list = HashList::Tombstone;
        }
    }

    Ok(())
}

/// Overwrite local state with a remote record (remote-wins)
fn adopt_remote(
    opts: &SyncOptions,
    blocks: &mut impl BlockStoreApi,
    index: &mut FileInfoMap,
    theirs: &FileMetaData,
    report: &mut SyncReport,
) -> Result<()> {
    match &theirs.hash_list {
        HashList::Tombstone => {
            if remove_local_file(&opts.base_dir, &theirs.filename)? {
                report.deleted += 1;
            }
        }
        HashList::Blocks(hashes) => {
            download_file(&opts.base_dir, &theirs.filename, hashes, blocks)?;
            report.downloaded += 1;
        }
    }
    index.insert(theirs.filename.clone(), theirs.clone());
    Ok(())
}

/// Push a local record: blocks first, then the metadata proposal. A
/// rejection means a concurrent writer won; re-fetch and yield to it.
fn propose_upload(
    opts: &SyncOptions,
    meta: &mut impl MetaStoreApi,
    blocks: &mut impl BlockStoreApi,
    index: &mut FileInfoMap,
    ours: FileMetaData,
    report: &mut SyncReport,
) -> Result<()> {
    if !ours.is_tombstone() {
        upload_blocks(&opts.base_dir, &ours.filename, opts.block_size, blocks)?;
    }

    let accepted = meta.update_file(&ours)?;
    if accepted == REJECTED_VERSION {
        warn!("update of {} rejected, yielding to remote", ours.filename);
        report.conflicts += 1;

        let remote = meta.get_file_info_map()?;
        let theirs = remote.get(&ours.filename).ok_or_else(|| {
            eyre!(
                "{} was rejected but has no remote record",
                ours.filename
            )
        })?;
        adopt_remote(opts, blocks, index, theirs, report)?;
        return Ok(());
    }

    debug!("{} accepted at version {accepted}", ours.filename);
    if ours.is_tombstone() {
        report.tombstones_pushed += 1;
    } else {
        report.uploaded += 1;
    }
    index.insert(ours.filename.clone(), ours);
    Ok(())
}

/// Upload a file's blocks, skipping those the store already holds
fn upload_blocks(
    base_dir: &Path,
    name: &str,
    block_size: usize,
    blocks: &mut impl BlockStoreApi,
) -> Result<()> {
    info!("uploading {name}");
    let data = std::fs::read(base_dir.join(name))?;
    let chunks = chunker::split_blocks(&data, block_size);
    let hashes: Vec<BlockHash> = chunks.iter().map(|c| BlockHash::of(c)).collect();

    let have: HashSet<BlockHash> = blocks.has_blocks(&hashes)?.into_iter().collect();
    for (chunk, hash) in chunks.iter().zip(&hashes) {
        if have.contains(hash) {
            continue;
        }
        blocks.put_block(chunk)?;
    }

    Ok(())
}

/// Fetch a file's blocks in hash-list order and write it out
fn download_file(
    base_dir: &Path,
    name: &str,
    hashes: &[BlockHash],
    blocks: &mut impl BlockStoreApi,
) -> Result<()> {
    info!("downloading {name}");
    let path = base_dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut data = Vec::new();
    for hash in hashes {
        let block = blocks.get_block(hash)?;
        data.extend_from_slice(&block);
    }

    std::fs::write(&path, data)?;
    Ok(())
}

/// Remove a local file if present; returns whether anything was removed
fn remove_local_file(base_dir: &Path, name: &str) -> Result<bool> {
    let path = base_dir.join(name);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            info!("removed {name}");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
