//! Fixed-size block chunking
//!
//! Files travel as whole blocks of at most `block_size` bytes. Every block
//! except the last is exactly `block_size`; an empty file has no blocks.

use std::io::Read;
use std::path::Path;

use bytes::Bytes;
use color_eyre::eyre::ensure;

use crate::hash::BlockHash;

/// Default block size in bytes
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Split bytes into `block_size` chunks (the last may be shorter)
#[must_use]
pub fn split_blocks(data: &[u8], block_size: usize) -> Vec<Bytes> {
    data.chunks(block_size).map(Bytes::copy_from_slice).collect()
}

/// Digest each `block_size` chunk of `data` in order
#[must_use]
pub fn hash_blocks(data: &[u8], block_size: usize) -> Vec<BlockHash> {
    data.chunks(block_size).map(BlockHash::of).collect()
}

/// Compute a file's ordered block digest list by streaming it in
/// `block_size` chunks.
///
/// # Errors
/// Returns an error if `block_size` is zero or the file cannot be read.
pub fn file_hash_list(path: &Path, block_size: usize) -> color_eyre::Result<Vec<BlockHash>> {
    ensure!(block_size > 0, "block size must be positive");

    let mut file = std::fs::File::open(path)?;
    let mut buf = vec![0u8; block_size];
    let mut hashes = Vec::new();

    loop {
        let n = read_full(&mut file, &mut buf)?;
        if n == 0 {
            break;
        }
        hashes.push(BlockHash::of(&buf[..n]));
        if n < block_size {
            break;
        }
    }

    Ok(hashes)
}

/// Read until the buffer is full or EOF, returning the bytes read
fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_no_blocks() {
        assert!(split_blocks(b"", 4096).is_empty());
        assert!(hash_blocks(b"", 4096).is_empty());
    }

    #[test]
    fn test_small_input_is_one_block() {
        let blocks = split_blocks(b"helloworld", 4096);
        assert_eq!(blocks.len(), 1);
        assert_eq!(&blocks[0][..], b"helloworld");
    }

    #[test]
    fn test_partial_trailing_block() {
        // block_size + 7 bytes must yield exactly two blocks, the second
        // holding the trailing 7 bytes
        let data = vec![0xabu8; 4096 + 7];
        let blocks = split_blocks(&data, 4096);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].len(), 4096);
        assert_eq!(blocks[1].len(), 7);

        let hashes = hash_blocks(&data, 4096);
        assert_eq!(hashes.len(), 2);
        assert_eq!(hashes[1], BlockHash::of(&data[4096..]));
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let data = vec![1u8; 4096 * 2];
        assert_eq!(split_blocks(&data, 4096).len(), 2);
    }

    #[test]
    fn test_split_concat_roundtrip() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let blocks = split_blocks(&data, 1024);
        let joined: Vec<u8> = blocks.iter().flat_map(|b| b.iter().copied()).collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn test_file_hash_list_matches_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let data = vec![0x5au8; 4096 + 7];
        std::fs::write(&path, &data).unwrap();

        let from_file = file_hash_list(&path, 4096).unwrap();
        assert_eq!(from_file, hash_blocks(&data, 4096));
        assert_eq!(from_file.len(), 2);
    }

    #[test]
    fn test_file_hash_list_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();
        assert!(file_hash_list(&path, 4096).unwrap().is_empty());
    }

    #[test]
    fn test_zero_block_size_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"x").unwrap();
        assert!(file_hash_list(&path, 0).is_err());
    }
}
