//! Authoritative file metadata with version arbitration
//!
//! One record per filename, never removed; deletions are tombstones at an
//! incremented version. `update_file` is the single write path: a proposal
//! is accepted iff its version is exactly one past the current record (or 1
//! for a new file). Two clients racing to the same next version resolve to
//! exactly one acceptance; the loser re-fetches and yields.

use std::sync::Mutex;

use tidesync_core::{FileInfoMap, FileMetaData, REJECTED_VERSION};

/// In-memory metadata store behind a coarse lock
pub struct MetaStore {
    files: Mutex<FileInfoMap>,
    /// Address of the paired block store, reported to clients
    block_store_addr: String,
}

impl MetaStore {
    #[must_use]
    pub fn new(block_store_addr: impl Into<String>) -> Self {
        Self {
            files: Mutex::new(FileInfoMap::new()),
            block_store_addr: block_store_addr.into(),
        }
    }

    /// Snapshot of the complete mapping
    ///
    /// The copy is detached: it never reflects later updates and cannot
    /// expose a partially-applied one.
    #[must_use]
    pub fn file_info_map(&self) -> FileInfoMap {
        self.files.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Propose a new record for a file.
    ///
    /// Accepts iff `proposal.version` is exactly `current + 1`, or 1 for a
    /// file with no record yet. Returns the accepted version, or
    /// [`REJECTED_VERSION`] leaving the store unchanged.
    pub fn update_file(&self, proposal: FileMetaData) -> i32 {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());

        let expected = files
            .get(&proposal.filename)
            .map_or(1, |current| current.version + 1);
        if proposal.version != expected {
            return REJECTED_VERSION;
        }

        let version = proposal.version;
        files.insert(proposal.filename.clone(), proposal);
        version
    }

    /// The paired block store's address
    #[must_use]
    pub fn block_store_addr(&self) -> &str {
        &self.block_store_addr
    }

    /// Number of records (tombstones included)
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
