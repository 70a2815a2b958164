//! tidesync-client: RPC sessions and the sync reconciliation engine
//!
//! The engine is generic over the two service traits so tests can swap the
//! TCP sessions for in-process fakes.

pub mod engine;
pub mod rpc;

pub use engine::{sync_cycle, SyncOptions, SyncReport};
pub use rpc::{BlockStoreSession, MetaStoreSession};

use bytes::Bytes;
use color_eyre::Result;
use tidesync_core::{BlockHash, FileInfoMap, FileMetaData};

/// Client-side view of the block store RPC surface
pub trait BlockStoreApi {
    /// Fetch the block stored under `hash`; an unknown hash is an error
    /// (it signals server-side inconsistency)
    fn get_block(&mut self, hash: &BlockHash) -> Result<Bytes>;

    /// Store a block; the server keys it by digest
    fn put_block(&mut self, data: &[u8]) -> Result<()>;

    /// Of `hashes`, the subset the server already holds
    fn has_blocks(&mut self, hashes: &[BlockHash]) -> Result<Vec<BlockHash>>;
}

/// Client-side view of the metadata store RPC surface
pub trait MetaStoreApi {
    /// The complete current filename -> record snapshot
    fn get_file_info_map(&mut self) -> Result<FileInfoMap>;

    /// Propose a new record. Returns the accepted version, or
    /// [`tidesync_core::REJECTED_VERSION`] if the proposal lost a version
    /// race (a protocol signal, not an error).
    fn update_file(&mut self, meta: &FileMetaData) -> Result<i32>;

    /// Address of the block store paired with this metadata store
    fn get_block_store_addr(&mut self) -> Result<String>;
}
