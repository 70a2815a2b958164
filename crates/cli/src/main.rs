//! tidesync: Dropbox-style directory synchronization
//!
//! Clients reconcile a base directory against a central metadata store;
//! file contents travel as immutable SHA-256-addressed blocks. The
//! metadata store arbitrates concurrent updates by version number, so any
//! set of clients polling the same namespace converges on one view.

mod debug_log;

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use clap::builder::styling::{AnsiColor, Effects};
use clap::{builder::Styles, Parser, Subcommand};
use color_eyre::eyre::{ensure, eyre, Result};
use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult};
use tracing::{debug, error, info};

use tidesync_client::{sync_cycle, BlockStoreSession, MetaStoreApi as _, MetaStoreSession, SyncOptions};
use tidesync_core::config::CONFIG_FILENAME;
use tidesync_core::{file_hash_list, BlockHash, ClientConfig, Scanner, DEFAULT_BLOCK_SIZE, INDEX_FILENAME};

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default())
    .valid(AnsiColor::Green.on_default())
    .invalid(AnsiColor::Red.on_default());

#[derive(Parser)]
#[command(name = "tidesync")]
#[command(version)]
#[command(styles = STYLES)]
#[command(about = "Sync a directory through a content-addressed block store")]
#[command(long_about = r#"
tidesync keeps directories on multiple machines in agreement.

A central metadata store arbitrates file versions; contents travel as
immutable SHA-256-addressed blocks. Deletions propagate as tombstones.
Clients that lose a version race yield to the accepted writer, so
everyone converges on the same view.

Examples:
  tidesync sync ./notes --meta-addr 10.0.0.5:7600    One sync cycle
  tidesync watch ./notes --meta-addr 10.0.0.5:7600   Sync on every change
  tidesync scan ./notes                              Hash locally, no network
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write trace logs to /tmp instead of the console
    #[arg(long, global = true)]
    debug_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync cycle against the metadata store
    Sync {
        /// Base directory to sync
        dir: PathBuf,

        /// Metadata store address (overrides .tidesync.toml)
        #[arg(short, long)]
        meta_addr: Option<String>,

        /// Block size in bytes (overrides .tidesync.toml)
        #[arg(short, long)]
        block_size: Option<u32>,

        /// Per-RPC deadline in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },

    /// Sync continuously, re-running on filesystem changes
    Watch {
        /// Base directory to sync
        dir: PathBuf,

        /// Metadata store address (overrides .tidesync.toml)
        #[arg(short, long)]
        meta_addr: Option<String>,

        /// Block size in bytes (overrides .tidesync.toml)
        #[arg(short, long)]
        block_size: Option<u32>,

        /// Per-RPC deadline in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,

        /// Debounce delay in milliseconds
        #[arg(short, long, default_value = "500")]
        debounce: u64,
    },

    /// Hash a directory locally and print its block lists
    Scan {
        /// Directory to scan
        dir: PathBuf,

        /// Block size in bytes (overrides .tidesync.toml)
        #[arg(short, long)]
        block_size: Option<u32>,

        /// Output format (json, summary)
        #[arg(short, long, default_value = "summary")]
        format: String,
    },

    /// Show version and build info
    Version,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Setup logging
    let _log_guard = if cli.debug_log {
        let log = debug_log::to_file();
        eprintln!("trace log: {}", log.path.display());
        Some(log)
    } else {
        let filter = if cli.verbose { "debug" } else { "info" };
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
        None
    };

    match cli.command {
        Commands::Version => {
            eprintln!("tidesync {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Scan {
            dir,
            block_size,
            format,
        } => {
            scan_command(&dir, block_size, &format)?;
        }
        Commands::Sync {
            dir,
            meta_addr,
            block_size,
            timeout,
        } => {
            let (opts, meta_addr) = resolve(&dir, meta_addr, block_size)?;
            sync_command(&opts, &meta_addr, Duration::from_secs(timeout))?;
        }
        Commands::Watch {
            dir,
            meta_addr,
            block_size,
            timeout,
            debounce,
        } => {
            let (opts, meta_addr) = resolve(&dir, meta_addr, block_size)?;
            watch_command(&opts, &meta_addr, Duration::from_secs(timeout), debounce)?;
        }
    }

    Ok(())
}

/// Merge CLI flags over the directory's `.tidesync.toml`
fn resolve(
    dir: &Path,
    meta_addr: Option<String>,
    block_size: Option<u32>,
) -> Result<(SyncOptions, String)> {
    let config = ClientConfig::load(dir)?;

    let meta_addr = meta_addr.or(config.meta_addr).ok_or_else(|| {
        eyre!("no metadata store address; pass --meta-addr or set meta_addr in {CONFIG_FILENAME}")
    })?;
    let block_size = effective_block_size(block_size, config.block_size)?;

    let opts = SyncOptions {
        base_dir: dir.to_path_buf(),
        block_size,
        ignore: config.ignore,
    };
    Ok((opts, meta_addr))
}

fn effective_block_size(flag: Option<u32>, config: Option<u32>) -> Result<usize> {
    let block_size = flag.or(config).unwrap_or(DEFAULT_BLOCK_SIZE as u32);
    ensure!(block_size > 0, "block size must be positive");
    Ok(block_size as usize)
}

fn sync_command(opts: &SyncOptions, meta_addr: &str, timeout: Duration) -> Result<()> {
    info!(
        "syncing {} against {meta_addr}",
        opts.base_dir.display()
    );

    let mut meta = MetaStoreSession::connect(meta_addr, timeout)?;
    let block_addr = meta.get_block_store_addr()?;
    debug!("block store at {block_addr}");
    let mut blocks = BlockStoreSession::connect(&block_addr, timeout)?;

    let report = sync_cycle(opts, &mut meta, &mut blocks)?;
    info!(
        "sync complete: {} up, {} down, {} deleted, {} tombstoned, {} conflicts, {} unchanged",
        report.uploaded,
        report.downloaded,
        report.deleted,
        report.tombstones_pushed,
        report.conflicts,
        report.unchanged
    );
    Ok(())
}

fn watch_command(
    opts: &SyncOptions,
    meta_addr: &str,
    timeout: Duration,
    debounce_ms: u64,
) -> Result<()> {
    // Initial sync
    sync_command(opts, meta_addr, timeout)?;

    // Setup file watcher
    let (tx, rx) = mpsc::channel();

    let mut debouncer = new_debouncer(
        Duration::from_millis(debounce_ms),
        None,
        move |result: DebounceEventResult| {
            if let Ok(events) = result {
                let _ = tx.send(events);
            }
        },
    )?;

    debouncer.watch(&opts.base_dir, RecursiveMode::Recursive)?;

    info!("watching for changes (Ctrl+C to stop)...");

    loop {
        match rx.recv() {
            Ok(events) => {
                let paths: Vec<_> = events.iter().flat_map(|e| e.paths.iter()).collect();

                // The cycle itself rewrites the index; don't loop on it
                if paths.iter().all(|p| is_reserved_path(p)) {
                    continue;
                }

                info!("detected {} changed paths, syncing...", paths.len());
                for path in &paths {
                    debug!("  changed: {}", path.display());
                }

                if let Err(e) = sync_command(opts, meta_addr, timeout) {
                    error!("sync failed: {e}");
                }
            }
            Err(e) => {
                error!("watch error: {e}");
                break;
            }
        }
    }

    Ok(())
}

/// True for paths the sync cycle itself writes
fn is_reserved_path(path: &Path) -> bool {
    path.ends_with(INDEX_FILENAME) || path.ends_with(CONFIG_FILENAME)
}

fn scan_command(dir: &Path, block_size: Option<u32>, format: &str) -> Result<()> {
    let config = ClientConfig::load(dir)?;
    let block_size = effective_block_size(block_size, config.block_size)?;

    info!("scanning {} ({block_size}-byte blocks)...", dir.display());

    let mut scanner = Scanner::new(dir);
    for pattern in &config.ignore {
        scanner = scanner.ignore(pattern);
    }
    let names = scanner.scan()?;

    let mut listed = Vec::with_capacity(names.len());
    for name in names {
        let hashes = file_hash_list(&dir.join(&name), block_size)?;
        listed.push((name, hashes));
    }

    match format {
        "json" => {
            let files: Vec<_> = listed
                .iter()
                .map(|(name, hashes)| {
                    serde_json::json!({
                        "filename": name,
                        "blocks": hashes.iter().map(BlockHash::to_hex).collect::<Vec<_>>(),
                    })
                })
                .collect();
            eprintln!("{}", serde_json::to_string_pretty(&files)?);
        }
        _ => {
            let total_blocks: usize = listed.iter().map(|(_, h)| h.len()).sum();
            eprintln!("Files: {}", listed.len());
            eprintln!("Blocks: {total_blocks}");

            if listed.len() <= 20 {
                eprintln!("\nFiles:");
                for (name, hashes) in &listed {
                    eprintln!("  {name} ({} blocks)", hashes.len());
                }
            }
        }
    }

    Ok(())
}
