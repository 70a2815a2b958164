//! tidesyncd: block and metadata store daemon

use std::net::TcpListener;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::Result;

use tidesync_store::{serve_block_store, serve_meta_store, BlockStore, MetaStore};

#[derive(Parser)]
#[command(name = "tidesyncd")]
#[command(version)]
#[command(about = "tidesync block and metadata store daemon")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a block store service
    Block {
        /// Listen address, e.g. 127.0.0.1:7601
        #[arg(short, long)]
        addr: String,
    },
    /// Run a metadata store service
    Meta {
        /// Listen address, e.g. 127.0.0.1:7600
        #[arg(short, long)]
        addr: String,
        /// Address of the paired block store, reported to clients
        #[arg(short, long)]
        block_store_addr: String,
    },
    /// Print version and exit
    Version,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Version => {
            eprintln!("tidesyncd {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Block { addr } => {
            let listener = TcpListener::bind(&addr)?;
            serve_block_store(listener, Arc::new(BlockStore::new()))?;
        }
        Commands::Meta {
            addr,
            block_store_addr,
        } => {
            let listener = TcpListener::bind(&addr)?;
            serve_meta_store(listener, Arc::new(MetaStore::new(block_store_addr)))?;
        }
    }

    Ok(())
}
