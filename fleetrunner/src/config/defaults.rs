//! Default values and paths for runner configuration.
//!
//! Timing constants here are policy defaults, not invariants: every one
//! of them can be overridden in `config.ini`.

use std::path::PathBuf;

/// Directory under the home directory holding runner state.
pub const CONFIG_DIR_NAME: &str = ".fleetrunner";

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Default control-plane request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default initial backoff interval in milliseconds.
pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 500;

/// Default cap on a single backoff interval in seconds.
pub const DEFAULT_BACKOFF_MAX_INTERVAL_SECS: u64 = 30;

/// Default bound on total retry time for one call in seconds.
pub const DEFAULT_BACKOFF_MAX_ELAPSED_SECS: u64 = 120;

/// Default outer attempt count for task status submission.
pub const DEFAULT_STATUS_RETRY_ATTEMPTS: usize = 5;

/// Default heartbeat interval in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Default interval between event polls in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;

/// Default per-poll timeout in seconds.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Default bounded event-queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default dispatch worker count.
pub const DEFAULT_WORKER_COUNT: usize = 8;

/// Default interval between daemon-set readiness probes in seconds.
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 5;

/// Default bound on daemon-set startup in seconds.
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_SECS: u64 = 180;

/// Default interval between reconciliation passes in seconds.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;

/// First loopback port assigned to spawned daemon sets.
pub const DEFAULT_BASE_PORT: u16 = 14250;

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "fleetrunner.log";

/// Home directory, falling back to the current directory when the
/// environment does not provide one.
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Directory holding runner configuration and state.
pub fn config_dir() -> PathBuf {
    home_dir().join(CONFIG_DIR_NAME)
}

/// Full path of the configuration file.
pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Default directory for daemon-set executables.
pub fn default_executable_dir() -> PathBuf {
    config_dir().join("daemons")
}

/// Default directory for log files.
pub fn default_log_dir() -> PathBuf {
    config_dir().join("logs")
}
