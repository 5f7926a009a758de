//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file. These
//! are pure data types; parsing lives in [`super::file`].

use super::defaults::*;
use std::path::PathBuf;

/// Complete runner configuration loaded from config.ini.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    /// Control-plane connection and retry settings
    pub control_plane: ControlPlaneSettings,
    /// Event polling and worker pool settings
    pub dispatch: DispatchSettings,
    /// Daemon-set lifecycle settings
    pub daemon_sets: DaemonSetSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Control-plane configuration: endpoint, identity, credentials, retry
/// tuning.
#[derive(Debug, Clone)]
pub struct ControlPlaneSettings {
    /// Base URL of the control plane, e.g. `https://plane.example.com`
    pub url: String,
    /// Account this runner belongs to
    pub account_id: String,
    /// Registered runner identity
    pub runner_id: String,
    /// Human-readable runner name
    pub runner_name: String,
    /// Bearer token presented on every call
    pub token: String,
    /// Hash identifying the token
    pub token_hash: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Initial backoff interval in milliseconds
    pub backoff_initial_ms: u64,
    /// Cap on a single backoff interval in seconds
    pub backoff_max_interval_secs: u64,
    /// Bound on total retry time for one call in seconds
    pub backoff_max_elapsed_secs: u64,
    /// Outer attempt count for status submission
    pub status_retry_attempts: usize,
    /// Heartbeat interval in seconds
    pub heartbeat_interval_secs: u64,
}

impl Default for ControlPlaneSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            account_id: String::new(),
            runner_id: String::new(),
            runner_name: String::new(),
            token: String::new(),
            token_hash: String::new(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            backoff_initial_ms: DEFAULT_BACKOFF_INITIAL_MS,
            backoff_max_interval_secs: DEFAULT_BACKOFF_MAX_INTERVAL_SECS,
            backoff_max_elapsed_secs: DEFAULT_BACKOFF_MAX_ELAPSED_SECS,
            status_retry_attempts: DEFAULT_STATUS_RETRY_ATTEMPTS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
        }
    }
}

/// Event polling and dispatch configuration.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Interval between event polls in seconds
    pub poll_interval_secs: u64,
    /// Per-poll timeout in seconds
    pub poll_timeout_secs: u64,
    /// Bounded event-queue capacity
    pub queue_capacity: usize,
    /// Dispatch worker count
    pub worker_count: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            worker_count: DEFAULT_WORKER_COUNT,
        }
    }
}

/// Daemon-set lifecycle configuration.
#[derive(Debug, Clone)]
pub struct DaemonSetSettings {
    /// Interval between readiness probes in seconds
    pub health_check_interval_secs: u64,
    /// Bound on daemon-set startup in seconds
    pub health_check_timeout_secs: u64,
    /// Interval between reconciliation passes in seconds
    pub reconcile_interval_secs: u64,
    /// First loopback port assigned to spawned daemon sets
    pub base_port: u16,
    /// Install tree holding daemon-set executables
    pub executable_dir: PathBuf,
}

impl Default for DaemonSetSettings {
    fn default() -> Self {
        Self {
            health_check_interval_secs: DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
            health_check_timeout_secs: DEFAULT_HEALTH_CHECK_TIMEOUT_SECS,
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            base_port: DEFAULT_BASE_PORT,
            executable_dir: default_executable_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingSettings {
    /// Directory for log files
    pub directory: PathBuf,
    /// Log file name
    pub file: String,
    /// Whether to mirror logs to stdout
    pub stdout: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: default_log_dir(),
            file: DEFAULT_LOG_FILE.to_string(),
            stdout: true,
        }
    }
}
