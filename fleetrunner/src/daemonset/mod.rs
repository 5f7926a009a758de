//! Daemon-set lifecycle management and reconciliation.
//!
//! A daemon set is a long-lived auxiliary worker process managed on
//! behalf of the control plane, addressed by a stable `type` and
//! exposing a loopback control API. This module keeps the local fleet of
//! daemon sets converged with the control plane's declared state:
//!
//! ```text
//! ┌──────────────────────┐   desired state   ┌────────────────────┐
//! │ DaemonSetReconciler  │◄─────────────────►│   Control plane    │
//! │  (1 min control loop)│    state report   └────────────────────┘
//! └──────────┬───────────┘
//!            │ upsert / remove / task diff
//!            ▼
//! ┌──────────────────────┐
//! │   DaemonSetManager   │  per-type key lock, health checks
//! └──────────┬───────────┘
//!            │ start / stop / tasks
//!            ▼
//! ┌──────────────────────┐
//! │   DaemonSetDriver    │  child process + loopback control API
//! └──────────────────────┘
//! ```

pub mod downloader;
pub mod driver;
pub mod manager;
pub mod reconciler;
pub mod types;

pub use downloader::{DirectoryDownloader, DownloadError, ExecutableDownloader};
pub use driver::{
    DaemonSetDriver, DriverError, LocalProcessDriver, DEFAULT_BASE_PORT, PORT_ENV_VAR,
};
pub use manager::{
    DaemonSetManager, ManagerError, ManagerOptions, DEFAULT_HEALTH_CHECK_INTERVAL,
    DEFAULT_HEALTH_CHECK_TIMEOUT,
};
pub use reconciler::{
    reconcile_once, DaemonSetReconciler, ReconcileError, ReconcilerOptions,
    DEFAULT_RECONCILE_INTERVAL,
};
pub use types::{DaemonSet, ProcessHandle, ServerInfo};
