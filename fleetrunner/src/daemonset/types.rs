//! In-memory state for managed daemon sets.

use crate::api::types::{DaemonTask, OperationalConfig};
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::Mutex;

/// Shared handle to a daemon set's child process.
///
/// The handle is `None` before the first spawn and after the process has
/// been stopped; `stop` takes the child out so a second stop is a no-op.
pub type ProcessHandle = Arc<Mutex<Option<Child>>>;

/// Live server handle for a running daemon set.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// Loopback port the child's control API listens on.
    pub port: u16,
    /// Handle to the spawned process.
    pub process: ProcessHandle,
}

impl ServerInfo {
    pub fn new(port: u16, child: Child) -> Self {
        Self {
            port,
            process: Arc::new(Mutex::new(Some(child))),
        }
    }
}

/// One managed daemon set.
///
/// `set_type` is the stable identity key: one running instance per type.
/// `id` is a correlation handle the control plane may reassign without a
/// restart when the config is unchanged. Owned exclusively by the
/// manager; mutated only while holding the type's key lock.
#[derive(Debug, Clone)]
pub struct DaemonSet {
    pub id: String,
    pub set_type: String,
    pub config: OperationalConfig,
    /// Present once the process has been started; absent before the
    /// first successful spawn.
    pub server_info: Option<ServerInfo>,
    /// Sticky flag set by the most recent liveness probe.
    pub healthy: bool,
    /// Tasks last observed assigned on the running instance.
    pub tasks: Vec<DaemonTask>,
}

impl DaemonSet {
    /// A new entry in the `Starting` state: no server, not yet healthy.
    pub fn new(id: impl Into<String>, set_type: impl Into<String>, config: OperationalConfig) -> Self {
        Self {
            id: id.into(),
            set_type: set_type.into(),
            config,
            server_info: None,
            healthy: false,
            tasks: Vec::new(),
        }
    }

    /// IDs of the tasks last observed on this instance.
    pub fn task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.task_id.clone()).collect()
    }
}
