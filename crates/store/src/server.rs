//! TCP serving loops for the block and metadata services
//!
//! Thread per connection; each connection is a read-dispatch-reply loop over
//! the framed protocol until EOF. Handler failures become Error frames so
//! the client sees the diagnostic instead of a dropped socket.

use std::io::{BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use color_eyre::Result;
use tracing::{debug, info, warn};

use tidesync_core::{Message, ProtocolReader, ProtocolWriter};

use crate::{BlockStore, MetaStore};

/// Serve block store requests on `listener` until the process exits
///
/// # Errors
/// Returns an error if the listener itself fails.
pub fn serve_block_store(listener: TcpListener, store: Arc<BlockStore>) -> Result<()> {
    info!("block store listening on {}", listener.local_addr()?);

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    if let Err(e) = handle_block_conn(stream, &store) {
                        debug!("block store connection ended: {e}");
                    }
                });
            }
            Err(e) => warn!("accept failed: {e}"),
        }
    }

    Ok(())
}

/// Serve metadata store requests on `listener` until the process exits
///
/// # Errors
/// Returns an error if the listener itself fails.
pub fn serve_meta_store(listener: TcpListener, store: Arc<MetaStore>) -> Result<()> {
    info!(
        "meta store listening on {}, paired block store at {}",
        listener.local_addr()?,
        store.block_store_addr()
    );

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    if let Err(e) = handle_meta_conn(stream, &store) {
                        debug!("meta store connection ended: {e}");
                    }
                });
            }
            Err(e) => warn!("accept failed: {e}"),
        }
    }

    Ok(())
}

fn split(stream: TcpStream) -> Result<(ProtocolReader<BufReader<TcpStream>>, ProtocolWriter<BufWriter<TcpStream>>)> {
    let reader = ProtocolReader::new(BufReader::new(stream.try_clone()?));
    let writer = ProtocolWriter::new(BufWriter::new(stream));
    Ok((reader, writer))
}

fn handle_block_conn(stream: TcpStream, store: &BlockStore) -> Result<()> {
    let peer = stream.peer_addr()?;
    debug!("block store connection from {peer}");
    let (mut reader, mut writer) = split(stream)?;

    loop {
        // EOF (or a torn frame) ends the connection
        let Ok(request) = reader.read_message() else {
            break;
        };

        match request {
            Message::GetBlock { hash } => match store.get(&hash) {
                Some(data) => writer.send_block(&data)?,
                None => writer.send_error(&format!("block not found: {}", hash.to_hex()))?,
            },

            Message::PutBlock { data } => {
                let hash = store.put(data);
                debug!("stored block {hash:?}");
                writer.send_success(true)?;
            }

            Message::HasBlocks { hashes } => {
                writer.send_block_hashes(&store.has(&hashes))?;
            }

            other => {
                writer.send_error(&format!(
                    "unexpected message for block store: {}",
                    other.kind()
                ))?;
            }
        }
    }

    debug!(
        "block store connection from {peer} closed ({} blocks, {} bytes held)",
        store.len(),
        store.total_bytes()
    );
    Ok(())
}

fn handle_meta_conn(stream: TcpStream, store: &MetaStore) -> Result<()> {
    let peer = stream.peer_addr()?;
    debug!("meta store connection from {peer}");
    let (mut reader, mut writer) = split(stream)?;

    loop {
        let Ok(request) = reader.read_message() else {
            break;
        };

        match request {
            Message::GetFileInfoMap => {
                writer.send_file_info_map(&store.file_info_map())?;
            }

            Message::UpdateFile { meta } => {
                let filename = meta.filename.clone();
                let proposed = meta.version;
                let accepted = store.update_file(meta);
                if accepted == proposed {
                    info!("accepted {filename} at version {accepted}");
                } else {
                    info!("rejected {filename} at version {proposed}");
                }
                writer.send_version(accepted)?;
            }

            Message::GetBlockStoreAddr => {
                writer.send_block_store_addr(store.block_store_addr())?;
            }

            other => {
                writer.send_error(&format!(
                    "unexpected message for meta store: {}",
                    other.kind()
                ))?;
            }
        }
    }

    debug!("meta store connection from {peer} closed");
    Ok(())
}
