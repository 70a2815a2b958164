//! Optional file logging
//!
//! `tidesync watch` can run for days, and by the time something goes wrong
//! the console scrollback is gone. `--debug-log` routes trace output to a
//! per-run file under the system temp directory instead of the console.

use std::path::PathBuf;

use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::Layer as _;

/// Handle for an active file log.
///
/// Dropping it flushes and stops the background writer, so hold it for the
/// life of the process.
pub struct FileLog {
    /// Where the log lines are going
    pub path: PathBuf,
    _worker: tracing_appender::non_blocking::WorkerGuard,
}

/// Route all tracing output to a fresh log file.
///
/// Each run gets its own file, named by a random session id so concurrent
/// invocations never interleave.
pub fn to_file() -> FileLog {
    let filename = format!("tidesync-{}.log", uuid::Uuid::new_v4());
    let dir = std::env::temp_dir();
    let path = dir.join(&filename);

    let appender = tracing_appender::rolling::never(&dir, &filename);
    let (writer, worker) = tracing_appender::non_blocking(appender);

    // Our crates at trace, everything else at warn
    let targets = Targets::new()
        .with_default(LevelFilter::WARN)
        .with_target("tidesync", LevelFilter::TRACE)
        .with_target("tidesync_core", LevelFilter::TRACE)
        .with_target("tidesync_client", LevelFilter::TRACE);

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(layer.with_filter(targets))
        .init();

    FileLog {
        path,
        _worker: worker,
    }
}
