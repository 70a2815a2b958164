//! End-to-end sync tests over real TCP services
//!
//! Each test boots a fresh block store and metadata store on ephemeral
//! ports, then drives full sync cycles from one or two client base
//! directories.

use std::net::TcpListener;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use tidesync_client::{
    sync_cycle, BlockStoreSession, MetaStoreApi, MetaStoreSession, SyncOptions, SyncReport,
};
use tidesync_core::{load_index, BlockHash, FileMetaData, HashList, REJECTED_VERSION};
use tidesync_store::{serve_block_store, serve_meta_store, BlockStore, MetaStore};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Start both services, returning the meta store address
fn start_servers() -> String {
    let block_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let block_addr = block_listener.local_addr().unwrap().to_string();
    let block_store = Arc::new(BlockStore::new());
    std::thread::spawn(move || serve_block_store(block_listener, block_store));

    let meta_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let meta_addr = meta_listener.local_addr().unwrap().to_string();
    let meta_store = Arc::new(MetaStore::new(block_addr));
    std::thread::spawn(move || serve_meta_store(meta_listener, meta_store));

    meta_addr
}

/// Run one sync cycle for a base directory, discovering the block store
/// through the metadata store as a real client does
fn sync(meta_addr: &str, base_dir: &Path) -> SyncReport {
    let mut meta = MetaStoreSession::connect(meta_addr, TIMEOUT).unwrap();
    let block_addr = meta.get_block_store_addr().unwrap();
    let mut blocks = BlockStoreSession::connect(&block_addr, TIMEOUT).unwrap();

    let opts = SyncOptions {
        base_dir: base_dir.to_path_buf(),
        block_size: 4096,
        ignore: Vec::new(),
    };
    sync_cycle(&opts, &mut meta, &mut blocks).unwrap()
}

#[test]
fn test_first_upload_then_download() {
    let meta_addr = start_servers();
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();

    std::fs::write(a.path().join("hello.txt"), "helloworld").unwrap();
    let report = sync(&meta_addr, a.path());
    assert_eq!(report.uploaded, 1);
    assert_eq!(load_index(a.path()).unwrap()["hello.txt"].version, 1);

    let report = sync(&meta_addr, b.path());
    assert_eq!(report.downloaded, 1);
    assert_eq!(
        std::fs::read_to_string(b.path().join("hello.txt")).unwrap(),
        "helloworld"
    );
    let index = load_index(b.path()).unwrap();
    assert_eq!(index["hello.txt"].version, 1);
    assert_eq!(
        index["hello.txt"].hash_list,
        HashList::Blocks(vec![BlockHash::of(b"helloworld")])
    );
}

#[test]
fn test_concurrent_edit_remote_wins() {
    let meta_addr = start_servers();
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();

    std::fs::write(a.path().join("hello.txt"), "helloworld").unwrap();
    sync(&meta_addr, a.path());
    sync(&meta_addr, b.path());

    // Both edit without syncing; A publishes first
    std::fs::write(a.path().join("hello.txt"), "A").unwrap();
    std::fs::write(b.path().join("hello.txt"), "B").unwrap();
    sync(&meta_addr, a.path());
    let report = sync(&meta_addr, b.path());

    assert_eq!(report.conflicts, 1);
    assert_eq!(
        std::fs::read_to_string(b.path().join("hello.txt")).unwrap(),
        "A"
    );
    assert_eq!(load_index(b.path()).unwrap()["hello.txt"].version, 2);
}

#[test]
fn test_delete_propagation() {
    let meta_addr = start_servers();
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();

    std::fs::write(a.path().join("hello.txt"), "helloworld").unwrap();
    sync(&meta_addr, a.path());
    sync(&meta_addr, b.path());

    std::fs::remove_file(a.path().join("hello.txt")).unwrap();
    let report = sync(&meta_addr, a.path());
    assert_eq!(report.tombstones_pushed, 1);

    let report = sync(&meta_addr, b.path());
    assert_eq!(report.deleted, 1);
    assert!(!b.path().join("hello.txt").exists());

    let index = load_index(b.path()).unwrap();
    assert!(index["hello.txt"].is_tombstone());
    assert_eq!(index["hello.txt"].version, 2);
}

#[test]
fn test_update_file_race_has_one_winner() {
    let meta_addr = start_servers();

    // Two clients both believe version 1 is current and race to propose 2
    let mut meta_a = MetaStoreSession::connect(&meta_addr, TIMEOUT).unwrap();
    let mut meta_b = MetaStoreSession::connect(&meta_addr, TIMEOUT).unwrap();

    let base = FileMetaData::new(
        "raced.txt",
        1,
        HashList::Blocks(vec![BlockHash::of(b"base")]),
    );
    assert_eq!(meta_a.update_file(&base).unwrap(), 1);

    let from_a = FileMetaData::new(
        "raced.txt",
        2,
        HashList::Blocks(vec![BlockHash::of(b"from a")]),
    );
    let from_b = FileMetaData::new(
        "raced.txt",
        2,
        HashList::Blocks(vec![BlockHash::of(b"from b")]),
    );

    let first = meta_a.update_file(&from_a).unwrap();
    let second = meta_b.update_file(&from_b).unwrap();
    assert_eq!(first, 2);
    assert_eq!(second, REJECTED_VERSION);

    // The loser re-fetches and sees the winner's record intact
    let map = meta_b.get_file_info_map().unwrap();
    assert_eq!(map["raced.txt"], from_a);
}

#[test]
fn test_losing_client_downloads_winner_content() {
    let meta_addr = start_servers();
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();

    std::fs::write(a.path().join("doc.txt"), "original").unwrap();
    sync(&meta_addr, a.path());
    sync(&meta_addr, b.path());

    // A wins version 2 through the store before B's cycle proposes it
    std::fs::write(a.path().join("doc.txt"), "winner").unwrap();
    sync(&meta_addr, a.path());

    std::fs::write(b.path().join("doc.txt"), "loser").unwrap();
    let report = sync(&meta_addr, b.path());

    assert_eq!(report.conflicts, 1);
    assert_eq!(
        std::fs::read_to_string(b.path().join("doc.txt")).unwrap(),
        "winner"
    );
}

#[test]
fn test_partial_block_reassembly() {
    let meta_addr = start_servers();
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();

    // blockSize + 7 bytes: two blocks, the second of 7 bytes
    let data: Vec<u8> = (0..4096 + 7).map(|i| (i * 31 % 256) as u8).collect();
    std::fs::write(a.path().join("big.bin"), &data).unwrap();
    sync(&meta_addr, a.path());

    let mut meta = MetaStoreSession::connect(&meta_addr, TIMEOUT).unwrap();
    let map = meta.get_file_info_map().unwrap();
    assert_eq!(map["big.bin"].hash_list.as_blocks().unwrap().len(), 2);

    sync(&meta_addr, b.path());
    assert_eq!(std::fs::read(b.path().join("big.bin")).unwrap(), data);
}

#[test]
fn test_empty_file_propagates() {
    let meta_addr = start_servers();
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();

    std::fs::write(a.path().join("empty"), "").unwrap();
    sync(&meta_addr, a.path());
    sync(&meta_addr, b.path());

    assert_eq!(std::fs::read(b.path().join("empty")).unwrap(), b"");
    assert_eq!(
        load_index(b.path()).unwrap()["empty"].hash_list,
        HashList::Blocks(Vec::new())
    );
}

#[test]
fn test_many_files_and_recreation() {
    let meta_addr = start_servers();
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();

    for i in 0..10 {
        std::fs::write(a.path().join(format!("file{i}.txt")), format!("body {i}")).unwrap();
    }
    let report = sync(&meta_addr, a.path());
    assert_eq!(report.uploaded, 10);

    let report = sync(&meta_addr, b.path());
    assert_eq!(report.downloaded, 10);

    // Delete then recreate: the version history keeps marching forward
    std::fs::remove_file(a.path().join("file3.txt")).unwrap();
    sync(&meta_addr, a.path());
    std::fs::write(a.path().join("file3.txt"), "reborn").unwrap();
    sync(&meta_addr, a.path());

    sync(&meta_addr, b.path());
    assert_eq!(
        std::fs::read_to_string(b.path().join("file3.txt")).unwrap(),
        "reborn"
    );
    let index = load_index(b.path()).unwrap();
    assert_eq!(index["file3.txt"].version, 3);
}
