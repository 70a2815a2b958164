//! TCP sessions speaking the framed tidesync protocol
//!
//! One request-response exchange per call over a persistent connection.
//! Per-RPC deadlines are layered as socket read/write timeouts set at
//! connect time; an Error frame from the server becomes an error carrying
//! the server's diagnostic.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::Bytes;
use color_eyre::eyre::{bail, eyre, Result};
use tracing::debug;

use tidesync_core::{
    BlockHash, FileInfoMap, FileMetaData, Message, ProtocolReader, ProtocolWriter,
};

use crate::{BlockStoreApi, MetaStoreApi};

fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let resolved = addr
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| eyre!("address resolved to nothing: {addr}"))?;

    let stream = TcpStream::connect_timeout(&resolved, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    debug!("connected to {addr}");
    Ok(stream)
}

type Reader = ProtocolReader<BufReader<TcpStream>>;
type Writer = ProtocolWriter<BufWriter<TcpStream>>;

fn split(stream: TcpStream) -> Result<(Reader, Writer)> {
    let reader = ProtocolReader::new(BufReader::new(stream.try_clone()?));
    let writer = ProtocolWriter::new(BufWriter::new(stream));
    Ok((reader, writer))
}

/// Session with a block store service
pub struct BlockStoreSession {
    reader: Reader,
    writer: Writer,
}

impl BlockStoreSession {
    /// Connect with the given per-RPC deadline
    ///
    /// # Errors
    /// Returns an error if the address cannot be resolved or connected.
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let (reader, writer) = split(connect(addr, timeout)?)?;
        Ok(Self { reader, writer })
    }
}

impl BlockStoreApi for BlockStoreSession {
    fn get_block(&mut self, hash: &BlockHash) -> Result<Bytes> {
        self.writer.send_get_block(hash)?;
        match self.reader.read_message()? {
            Message::Block { data } => Ok(data),
            Message::Error(msg) => bail!("block store: {msg}"),
            other => bail!("unexpected reply to GetBlock: {}", other.kind()),
        }
    }

    fn put_block(&mut self, data: &[u8]) -> Result<()> {
        self.writer.send_put_block(data)?;
        match self.reader.read_message()? {
            Message::Success { flag: true } => Ok(()),
            Message::Success { flag: false } => bail!("block store refused the block"),
            Message::Error(msg) => bail!("block store: {msg}"),
            other => bail!("unexpected reply to PutBlock: {}", other.kind()),
        }
    }

    fn has_blocks(&mut self, hashes: &[BlockHash]) -> Result<Vec<BlockHash>> {
        self.writer.send_has_blocks(hashes)?;
        match self.reader.read_message()? {
            Message::BlockHashes { hashes } => Ok(hashes),
            Message::Error(msg) => bail!("block store: {msg}"),
            other => bail!("unexpected reply to HasBlocks: {}", other.kind()),
        }
    }
}

/// Session with a metadata store service
pub struct MetaStoreSession {
    reader: Reader,
    writer: Writer,
}

impl MetaStoreSession {
    /// Connect with the given per-RPC deadline
    ///
    /// # Errors
    /// Returns an error if the address cannot be resolved or connected.
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let (reader, writer) = split(connect(addr, timeout)?)?;
        Ok(Self { reader, writer })
    }
}

impl MetaStoreApi for MetaStoreSession {
    fn get_file_info_map(&mut self) -> Result<FileInfoMap> {
        self.writer.send_get_file_info_map()?;
        match self.reader.read_message()? {
            Message::FileInfoMap { map } => Ok(map),
            Message::Error(msg) => bail!("meta store: {msg}"),
            other => bail!("unexpected reply to GetFileInfoMap: {}", other.kind()),
        }
    }

    fn update_file(&mut self, meta: &FileMetaData) -> Result<i32> {
        self.writer.send_update_file(meta)?;
        match self.reader.read_message()? {
            Message::Version { version } => Ok(version),
            Message::Error(msg) => bail!("meta store: {msg}"),
            other => bail!("unexpected reply to UpdateFile: {}", other.kind()),
        }
    }

    fn get_block_store_addr(&mut self) -> Result<String> {
        self.writer.send_get_block_store_addr()?;
        match self.reader.read_message()? {
            Message::BlockStoreAddr { addr } => Ok(addr),
            Message::Error(msg) => bail!("meta store: {msg}"),
            other => bail!("unexpected reply to GetBlockStoreAddr: {}", other.kind()),
        }
    }
}
