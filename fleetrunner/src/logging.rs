//! Logging infrastructure for the runner.
//!
//! Provides structured logging with file output and optional console
//! output:
//! - Writes to the configured log file (cleared on session start)
//! - Optionally mirrors to stdout for interactive runs
//! - Configurable via the RUST_LOG environment variable

use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard flushes and closes the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initializes the logging system with stdout mirroring enabled.
pub fn init_logging(log_dir: &Path, log_file: &str) -> Result<LoggingGuard, io::Error> {
    init_logging_full(log_dir, log_file, true, false)
}

/// Initializes the logging system.
///
/// # Arguments
///
/// * `log_dir` - Directory for log files, created if needed
/// * `log_file` - Log file name
/// * `stdout_enabled` - Whether to mirror logs to stdout
/// * `debug_mode` - When true, forces debug-level logging regardless of
///   RUST_LOG
///
/// # Returns
///
/// A [`LoggingGuard`] that must be kept alive for logging to work.
pub fn init_logging_full(
    log_dir: &Path,
    log_file: &str,
    stdout_enabled: bool,
    debug_mode: bool,
) -> Result<LoggingGuard, io::Error> {
    fs::create_dir_all(log_dir)?;

    // Clear the previous session's log file.
    let log_path = log_dir.join(log_file);
    fs::write(&log_path, "")?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let filter = if debug_mode {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(false);

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if stdout_enabled {
        let stdout_layer = tracing_subscriber::fmt::layer()
            .with_writer(io::stdout)
            .with_target(false);
        registry.with(stdout_layer).init();
    } else {
        registry.init();
    }

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
