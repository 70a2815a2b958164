//! Content-addressed block storage
//!
//! Stores opaque payloads keyed by their SHA-256 digest. Blocks are
//! immutable once stored and never deleted; re-putting identical data is a
//! no-op. The store has no awareness of files.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;
use tidesync_core::BlockHash;

/// In-memory block store behind a coarse lock
#[derive(Default)]
pub struct BlockStore {
    blocks: Mutex<HashMap<BlockHash, Bytes>>,
}

impl BlockStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a block under its digest, returning the key
    pub fn put(&self, data: Bytes) -> BlockHash {
        let hash = BlockHash::of(&data);
        let mut blocks = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        blocks.entry(hash).or_insert(data);
        hash
    }

    /// Fetch the exact bytes previously stored under `hash`
    #[must_use]
    pub fn get(&self, hash: &BlockHash) -> Option<Bytes> {
        let blocks = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        blocks.get(hash).cloned()
    }

    /// Of `hashes`, the subset present in the store, in input order
    #[must_use]
    pub fn has(&self, hashes: &[BlockHash]) -> Vec<BlockHash> {
        let blocks = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        hashes
            .iter()
            .filter(|h| blocks.contains_key(h))
            .copied()
            .collect()
    }

    /// Number of unique blocks stored
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total payload bytes stored
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        let blocks = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        blocks.values().map(|b| b.len() as u64).sum()
    }
}
