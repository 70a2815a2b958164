//! tidesync-store: block and metadata store services
//!
//! The block store is pure content-addressed storage; the metadata store
//! arbitrates concurrent updates through strictly increasing versions and
//! knows which block store it is paired with.

pub mod block_store;
pub mod meta_store;
pub mod server;

pub use block_store::BlockStore;
pub use meta_store::MetaStore;
pub use server::{serve_block_store, serve_meta_store};
