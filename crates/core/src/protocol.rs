//! Binary protocol spoken between sync clients and the stores
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
//! Block-store messages carry raw 32-byte digests (a tombstone never reaches
//! the block store). Metadata records encode hash-list entries as
//! length-prefixed strings so the tombstone marker `"0"` round-trips exactly.

use std::io::{Cursor, Read, Write};

use bytes::Bytes;
use color_eyre::eyre::{bail, ensure, eyre, Result};

use crate::hash::BlockHash;
use crate::meta::{FileInfoMap, FileMetaData, HashList};

/// Message type identifiers
pub mod msg {
    pub const GET_BLOCK_REQ: u8 = 0x01;
    pub const BLOCK_RESP: u8 = 0x02;
    pub const PUT_BLOCK_REQ: u8 = 0x03;
    pub const SUCCESS_RESP: u8 = 0x04;
    pub const HAS_BLOCKS_REQ: u8 = 0x05;
    pub const BLOCK_HASHES_RESP: u8 = 0x06;
    pub const FILE_INFO_MAP_REQ: u8 = 0x07;
    pub const FILE_INFO_MAP_RESP: u8 = 0x08;
    pub const UPDATE_FILE_REQ: u8 = 0x09;
    pub const VERSION_RESP: u8 = 0x0a;
    pub const BLOCK_STORE_ADDR_REQ: u8 = 0x0b;
    pub const BLOCK_STORE_ADDR_RESP: u8 = 0x0c;
    pub const ERROR_RESP: u8 = 0x0d;
}

/// Upper bound on a single frame's payload; a block plus framing always
/// fits well under this
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Bytes in a frame header: one type byte plus a u32 payload length
const HEADER_LEN: usize = 5;

fn encode_hashes(hashes: &[BlockHash]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + hashes.len() * 32);
    buf.extend_from_slice(&(hashes.len() as u32).to_be_bytes());
    for hash in hashes {
        buf.extend_from_slice(hash.as_bytes());
    }
    buf
}

fn decode_hashes(cursor: &mut Cursor<&[u8]>) -> Result<Vec<BlockHash>> {
    let mut count_buf = [0u8; 4];
    cursor.read_exact(&mut count_buf)?;
    let count = u32::from_be_bytes(count_buf) as usize;

    let mut hashes = Vec::with_capacity(count);
    for _ in 0..count {
        let mut raw = [0u8; 32];
        cursor.read_exact(&mut raw)?;
        hashes.push(BlockHash::from_raw(raw));
    }
    Ok(hashes)
}

fn encode_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u16).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn decode_string(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let mut len_buf = [0u8; 2];
    cursor.read_exact(&mut len_buf)?;
    let len = u16::from_be_bytes(len_buf) as usize;

    let mut bytes = vec![0u8; len];
    cursor.read_exact(&mut bytes)?;
    Ok(String::from_utf8(bytes)?)
}

/// Encode a metadata record
///
/// Format:
/// ```text
/// filename_len: u16, filename, version: i32,
/// entry_count: u32, for each entry: len: u16, ascii bytes
/// ```
fn encode_meta(buf: &mut Vec<u8>, meta: &FileMetaData) {
    encode_string(buf, &meta.filename);
    buf.extend_from_slice(&meta.version.to_be_bytes());

    let entries: Vec<String> = meta.hash_list.clone().into();
    buf.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for entry in &entries {
        encode_string(buf, entry);
    }
}

fn decode_meta(cursor: &mut Cursor<&[u8]>) -> Result<FileMetaData> {
    let filename = decode_string(cursor)?;

    let mut version_buf = [0u8; 4];
    cursor.read_exact(&mut version_buf)?;
    let version = i32::from_be_bytes(version_buf);

    let mut count_buf = [0u8; 4];
    cursor.read_exact(&mut count_buf)?;
    let count = u32::from_be_bytes(count_buf) as usize;

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        entries.push(decode_string(cursor)?);
    }

    Ok(FileMetaData {
        filename,
        version,
        hash_list: HashList::try_from(entries)?,
    })
}

/// Message received from the protocol
#[derive(Debug)]
pub enum Message {
    GetBlock { hash: BlockHash },
    Block { data: Bytes },
    PutBlock { data: Bytes },
    Success { flag: bool },
    HasBlocks { hashes: Vec<BlockHash> },
    BlockHashes { hashes: Vec<BlockHash> },
    GetFileInfoMap,
    FileInfoMap { map: FileInfoMap },
    UpdateFile { meta: FileMetaData },
    Version { version: i32 },
    GetBlockStoreAddr,
    BlockStoreAddr { addr: String },
    Error(String),
}

impl Message {
    /// Short name for diagnostics (never prints payloads)
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetBlock { .. } => "GetBlock",
            Self::Block { .. } => "Block",
            Self::PutBlock { .. } => "PutBlock",
            Self::Success { .. } => "Success",
            Self::HasBlocks { .. } => "HasBlocks",
            Self::BlockHashes { .. } => "BlockHashes",
            Self::GetFileInfoMap => "GetFileInfoMap",
            Self::FileInfoMap { .. } => "FileInfoMap",
            Self::UpdateFile { .. } => "UpdateFile",
            Self::Version { .. } => "Version",
            Self::GetBlockStoreAddr => "GetBlockStoreAddr",
            Self::BlockStoreAddr { .. } => "BlockStoreAddr",
            Self::Error(_) => "Error",
        }
    }
}

/// Protocol writer for sending messages
pub struct ProtocolWriter<W> {
    inner: W,
}

impl<W: Write> ProtocolWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    fn send_frame(&mut self, msg_type: u8, payload: &[u8]) -> Result<()> {
        ensure!(
            payload.len() as u64 <= u64::from(MAX_FRAME_LEN),
            "frame payload of {} bytes exceeds protocol limit",
            payload.len()
        );
        let mut header = [0u8; HEADER_LEN];
        header[0] = msg_type;
        header[1..].copy_from_slice(&(payload.len() as u32).to_be_bytes());
        self.inner.write_all(&header)?;
        self.inner.write_all(payload)?;
        self.inner.flush()?;
        Ok(())
    }

    pub fn send_get_block(&mut self, hash: &BlockHash) -> Result<()> {
        self.send_frame(msg::GET_BLOCK_REQ, hash.as_bytes())
    }

    pub fn send_block(&mut self, data: &[u8]) -> Result<()> {
        self.send_frame(msg::BLOCK_RESP, data)
    }

    pub fn send_put_block(&mut self, data: &[u8]) -> Result<()> {
        self.send_frame(msg::PUT_BLOCK_REQ, data)
    }

    pub fn send_success(&mut self, flag: bool) -> Result<()> {
        self.send_frame(msg::SUCCESS_RESP, &[u8::from(flag)])
    }

    pub fn send_has_blocks(&mut self, hashes: &[BlockHash]) -> Result<()> {
        self.send_frame(msg::HAS_BLOCKS_REQ, &encode_hashes(hashes))
    }

    pub fn send_block_hashes(&mut self, hashes: &[BlockHash]) -> Result<()> {
        self.send_frame(msg::BLOCK_HASHES_RESP, &encode_hashes(hashes))
    }

    pub fn send_get_file_info_map(&mut self) -> Result<()> {
        self.send_frame(msg::FILE_INFO_MAP_REQ, &[])
    }

    pub fn send_file_info_map(&mut self, map: &FileInfoMap) -> Result<()> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(map.len() as u32).to_be_bytes());
        for meta in map.values() {
            encode_meta(&mut payload, meta);
        }
        self.send_frame(msg::FILE_INFO_MAP_RESP, &payload)
    }

    pub fn send_update_file(&mut self, meta: &FileMetaData) -> Result<()> {
        let mut payload = Vec::new();
        encode_meta(&mut payload, meta);
        self.send_frame(msg::UPDATE_FILE_REQ, &payload)
    }

    pub fn send_version(&mut self, version: i32) -> Result<()> {
        self.send_frame(msg::VERSION_RESP, &version.to_be_bytes())
    }

    pub fn send_get_block_store_addr(&mut self) -> Result<()> {
        self.send_frame(msg::BLOCK_STORE_ADDR_REQ, &[])
    }

    pub fn send_block_store_addr(&mut self, addr: &str) -> Result<()> {
        self.send_frame(msg::BLOCK_STORE_ADDR_RESP, addr.as_bytes())
    }

    pub fn send_error(&mut self, message: &str) -> Result<()> {
        self.send_frame(msg::ERROR_RESP, message.as_bytes())
    }

    /// Get inner writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Protocol reader for receiving messages
pub struct ProtocolReader<R> {
    inner: R,
}

impl<R: Read> ProtocolReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read next message
    ///
    /// # Errors
    /// Returns an error on EOF, an oversized frame, or a malformed payload.
    pub fn read_message(&mut self) -> Result<Message> {
        let mut header = [0u8; HEADER_LEN];
        self.inner.read_exact(&mut header)?;
        let msg_type = header[0];
        let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
        ensure!(
            len <= MAX_FRAME_LEN,
            "frame of {len} bytes exceeds protocol limit"
        );

        let mut payload = vec![0u8; len as usize];
        self.inner.read_exact(&mut payload)?;
        let mut cursor = Cursor::new(payload.as_slice());

        match msg_type {
            msg::GET_BLOCK_REQ => {
                let mut raw = [0u8; 32];
                cursor.read_exact(&mut raw)?;
                Ok(Message::GetBlock {
                    hash: BlockHash::from_raw(raw),
                })
            }

            msg::BLOCK_RESP => Ok(Message::Block {
                data: Bytes::from(payload),
            }),

            msg::PUT_BLOCK_REQ => Ok(Message::PutBlock {
                data: Bytes::from(payload),
            }),

            msg::SUCCESS_RESP => {
                let mut flag = [0u8; 1];
                cursor.read_exact(&mut flag)?;
                Ok(Message::Success { flag: flag[0] != 0 })
            }

            msg::HAS_BLOCKS_REQ => Ok(Message::HasBlocks {
                hashes: decode_hashes(&mut cursor)?,
            }),

            msg::BLOCK_HASHES_RESP => Ok(Message::BlockHashes {
                hashes: decode_hashes(&mut cursor)?,
            }),

            msg::FILE_INFO_MAP_REQ => Ok(Message::GetFileInfoMap),

            msg::FILE_INFO_MAP_RESP => {
                let mut count_buf = [0u8; 4];
                cursor.read_exact(&mut count_buf)?;
                let count = u32::from_be_bytes(count_buf) as usize;

                let mut map = FileInfoMap::new();
                for _ in 0..count {
                    let meta = decode_meta(&mut cursor)?;
                    map.insert(meta.filename.clone(), meta);
                }
                Ok(Message::FileInfoMap { map })
            }

            msg::UPDATE_FILE_REQ => Ok(Message::UpdateFile {
                meta: decode_meta(&mut cursor)?,
            }),

            msg::VERSION_RESP => {
                let mut version_buf = [0u8; 4];
                cursor.read_exact(&mut version_buf)?;
                Ok(Message::Version {
                    version: i32::from_be_bytes(version_buf),
                })
            }

            msg::BLOCK_STORE_ADDR_REQ => Ok(Message::GetBlockStoreAddr),

            msg::BLOCK_STORE_ADDR_RESP => Ok(Message::BlockStoreAddr {
                addr: String::from_utf8(payload)
                    .map_err(|e| eyre!("address is not UTF-8: {e}"))?,
            }),

            msg::ERROR_RESP => Ok(Message::Error(
                String::from_utf8_lossy(&payload).to_string(),
            )),

            _ => bail!("unknown message type: {msg_type:#04x}"),
        }
    }

    /// Get inner reader
    pub fn into_inner(self) -> R {
        self.inner
    }
}
