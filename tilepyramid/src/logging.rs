//! Tracing subscriber setup for binaries embedding the engine.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    LogDirectory { path: PathBuf, source: io::Error },

    #[error("log file path {0} has no file name")]
    InvalidPath(PathBuf),
}

/// Keeps the background log writer alive. Dropping it flushes and stops
/// logging, so hold it for the life of the process.
#[must_use = "logging stops when the guard is dropped"]
pub struct LoggingGuard {
    _worker: WorkerGuard,
}

/// Builds the event filter: `RUST_LOG` wins over the configured level.
pub fn build_filter(level: &str) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::builder().from_env_lossy()
    } else {
        EnvFilter::builder().parse_lossy(format!("tilepyramid={level},tilepyramid_cli={level},warn"))
    }
}

/// Installs a global `fmt` subscriber writing to `log_file`, or to stderr
/// when no file is given.
///
/// A subscriber that is already installed is left in place.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> Result<LoggingGuard, LoggingError> {
    let (writer, guard) = match log_file {
        Some(path) => {
            let file_name = path
                .file_name()
                .ok_or_else(|| LoggingError::InvalidPath(path.to_path_buf()))?;
            let dir = match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
                _ => PathBuf::from("."),
            };
            std::fs::create_dir_all(&dir).map_err(|source| LoggingError::LogDirectory {
                path: dir.clone(),
                source,
            })?;
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name))
        }
        None => tracing_appender::non_blocking(io::stderr()),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_writer(writer)
        .with_ansi(log_file.is_none())
        .with_thread_names(true)
        .try_init();

    Ok(LoggingGuard { _worker: guard })
}
