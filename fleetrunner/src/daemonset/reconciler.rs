//! Periodic daemon-set reconciliation loop.
//!
//! The reconciler is a single background task that, on a fixed interval:
//!
//! 1. Self-heals every locally known type via [`DaemonSetManager::sync`].
//! 2. Reports local state to the control plane and receives the desired
//!    state back.
//! 3. Removes local types the control plane no longer declares.
//! 4. Converges every declared type: upsert, then diff the declared task
//!    IDs against what the running instance actually holds, removing
//!    stale tasks and acquiring/assigning newly desired ones.
//!
//! A single type's convergence failure is logged and skipped; it never
//! aborts the pass for other types. Only a reconcile-endpoint failure
//! aborts the pass, since there is no desired state to diff against.

use super::manager::{DaemonSetManager, ManagerError};
use crate::api::client::ControlPlane;
use crate::api::error::ApiError;
use crate::api::types::{AcquireDaemonTasksRequest, ReconcileEntry};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default interval between reconciliation passes.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

/// Reconciler tuning.
#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    pub interval: Duration,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONCILE_INTERVAL,
        }
    }
}

/// Failure while converging one daemon-set type.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Manager(#[from] ManagerError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Handle to the running reconciliation loop.
pub struct DaemonSetReconciler {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl DaemonSetReconciler {
    /// Spawns the loop. It runs until [`stop`](Self::stop) is called or
    /// `cancel` fires, whichever comes first.
    pub fn start(
        manager: Arc<DaemonSetManager>,
        client: Arc<dyn ControlPlane>,
        options: ReconcilerOptions,
        cancel: CancellationToken,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(manager, client, options, stop_rx, cancel));
        Self { stop_tx, handle }
    }

    /// Signals the loop to stop and waits for it to exit.
    ///
    /// The loop observes the signal at its next select point; there is
    /// no forced drain because each pass is bounded by its own call
    /// timeouts.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Reconciler task join failed");
        }
    }
}

async fn run_loop(
    manager: Arc<DaemonSetManager>,
    client: Arc<dyn ControlPlane>,
    options: ReconcilerOptions,
    mut stop_rx: watch::Receiver<bool>,
    cancel: CancellationToken,
) {
    info!(interval_secs = options.interval.as_secs(), "Daemon set reconciler started");

    let mut interval = tokio::time::interval(options.interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = stop_rx.changed() => break,
            _ = interval.tick() => {
                if *stop_rx.borrow() {
                    break;
                }
                if let Err(e) = reconcile_once(&manager, client.as_ref()).await {
                    warn!(error = %e, "Reconciliation pass aborted");
                }
            }
        }
    }

    info!("Daemon set reconciler stopped");
}

/// One full reconciliation pass.
///
/// Exposed so tests (and operators via the runtime) can force a pass
/// without waiting for the timer.
pub async fn reconcile_once(
    manager: &DaemonSetManager,
    client: &dyn ControlPlane,
) -> Result<(), ApiError> {
    // Self-heal before reporting so the report reflects reality.
    for set_type in manager.known_types() {
        if let Err(e) = manager.sync(&set_type).await {
            warn!(set_type = %set_type, error = %e, "Daemon set self-heal failed");
        }
    }

    let report = manager.report();
    let desired = client.reconcile(&report).await?;

    // Remove local types the control plane stopped declaring.
    let desired_types: HashSet<&str> = desired.iter().map(|e| e.set_type.as_str()).collect();
    for set_type in manager.known_types() {
        if !desired_types.contains(set_type.as_str()) {
            info!(set_type = %set_type, "Daemon set no longer declared, removing");
            manager.remove(&set_type).await;
        }
    }

    for entry in &desired {
        if entry.skip_update {
            debug!(set_type = %entry.set_type, "Skipping daemon set this round");
            continue;
        }
        if let Err(e) = converge_entry(manager, client, entry).await {
            warn!(set_type = %entry.set_type, error = %e, "Daemon set convergence failed");
        }
    }

    Ok(())
}

/// Converges one declared type: upsert, then task-set diff.
async fn converge_entry(
    manager: &DaemonSetManager,
    client: &dyn ControlPlane,
    entry: &ReconcileEntry,
) -> Result<(), ReconcileError> {
    let current = manager
        .upsert(&entry.daemon_set_id, &entry.set_type, entry.config.clone())
        .await?;

    let assigned: HashSet<&str> = current.iter().map(|t| t.task_id.as_str()).collect();
    let declared: HashSet<&str> = entry.task_ids.iter().map(|s| s.as_str()).collect();

    let stale: Vec<String> = assigned
        .difference(&declared)
        .map(|s| s.to_string())
        .collect();
    if !stale.is_empty() {
        debug!(set_type = %entry.set_type, count = stale.len(), "Removing stale daemon tasks");
        manager.remove_tasks(&entry.set_type, &stale).await?;
    }

    let missing: Vec<String> = declared
        .difference(&assigned)
        .map(|s| s.to_string())
        .collect();
    if !missing.is_empty() {
        let request = AcquireDaemonTasksRequest {
            daemon_set_id: entry.daemon_set_id.clone(),
            set_type: entry.set_type.clone(),
            task_ids: missing,
        };
        let params = client.acquire_daemon_tasks(&request).await?;
        if !params.is_empty() {
            debug!(set_type = %entry.set_type, count = params.len(), "Assigning new daemon tasks");
            manager.assign_tasks(&entry.set_type, &params).await?;
        }
    }

    Ok(())
}
