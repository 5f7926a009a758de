//! Daemon-set lifecycle manager.
//!
//! [`DaemonSetManager`] owns the authoritative in-memory table of running
//! daemon sets and exposes idempotent upsert/remove/assign operations.
//! Per type, the lifecycle is:
//!
//! ```text
//! Absent ──upsert──► Starting ──health check──► Healthy ⇄ Unhealthy
//!    ▲                                              │
//!    └───────────────── remove ─────────────────────┘
//! ```
//!
//! All table mutations for a type happen under that type's key lock, so
//! concurrent reconciliation passes cannot double-start a process. Reads
//! for reporting may race benignly with writes; the reconciler
//! re-converges every cycle.

use super::downloader::ExecutableDownloader;
use super::driver::{DaemonSetDriver, DriverError};
use super::types::DaemonSet;
use crate::api::types::{DaemonSetReport, DaemonTask, OperationalConfig};
use crate::keylock::KeyLock;
use crate::metrics::MetricsClient;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default interval between readiness probes of a starting daemon set.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound on how long a starting daemon set may take to answer.
pub const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(180);

/// Errors from manager operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The type has no entry in the table.
    #[error("daemon set type '{0}' is not managed by this runner")]
    UnknownType(String),

    /// The child never answered its task-list endpoint in time.
    #[error("daemon set '{set_type}' failed its health check within {timeout:?}")]
    HealthCheckTimeout { set_type: String, timeout: Duration },

    /// The executable could not be resolved.
    #[error("failed to resolve executable for daemon set '{set_type}': {message}")]
    Download { set_type: String, message: String },

    /// A driver-level failure.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Health-check tuning.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Interval between readiness probes after a spawn.
    pub health_check_interval: Duration,
    /// Total time a spawn may take before being flagged unhealthy.
    pub health_check_timeout: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            health_check_timeout: DEFAULT_HEALTH_CHECK_TIMEOUT,
        }
    }
}

/// Owns the daemon-set table and serializes per-type mutations.
pub struct DaemonSetManager {
    table: DashMap<String, DaemonSet>,
    locks: KeyLock,
    driver: Arc<dyn DaemonSetDriver>,
    downloader: Arc<dyn ExecutableDownloader>,
    options: ManagerOptions,
    metrics: MetricsClient,
}

impl DaemonSetManager {
    pub fn new(
        driver: Arc<dyn DaemonSetDriver>,
        downloader: Arc<dyn ExecutableDownloader>,
        options: ManagerOptions,
        metrics: MetricsClient,
    ) -> Self {
        Self {
            table: DashMap::new(),
            locks: KeyLock::new(),
            driver,
            downloader,
            options,
            metrics,
        }
    }

    /// Creates or converges the daemon set for `set_type`.
    ///
    /// Fast path: when an entry exists with an identical config and its
    /// task list is still retrievable, the running instance is reused;
    /// only the correlation `id` is refreshed. This is what prevents
    /// restart storms when the control plane redeclares unchanged state.
    /// Otherwise the executable is resolved, any existing instance is
    /// stopped and evicted, a new process is started, and its control
    /// API is polled until it answers or the health-check timeout
    /// elapses. The entry is stored even when the health check fails so
    /// the next reconciliation pass can observe and retry it.
    pub async fn upsert(
        &self,
        id: &str,
        set_type: &str,
        config: OperationalConfig,
    ) -> Result<Vec<DaemonTask>, ManagerError> {
        let _guard = self.locks.lock(set_type).await;

        if let Some(existing) = self.table.get(set_type).map(|e| e.value().clone()) {
            if existing.config.matches(&config) {
                match self.driver.list_tasks(&existing).await {
                    Ok(tasks) => {
                        if let Some(mut entry) = self.table.get_mut(set_type) {
                            entry.id = id.to_string();
                            entry.tasks = tasks.clone();
                        }
                        debug!(set_type, id, "Reusing daemon set with identical config");
                        return Ok(tasks);
                    }
                    Err(e) => {
                        // Believed identical but unreachable: fall back
                        // to a full respawn instead of failing the upsert.
                        warn!(set_type, error = %e, "Daemon set unreachable despite identical config, respawning");
                    }
                }
            }
        }

        self.respawn_locked(id, set_type, config).await
    }

    /// Probes liveness of a known daemon set, respawning on failure.
    ///
    /// No-op when the type is unknown or already flagged unhealthy:
    /// unhealthy is sticky and only an explicit upsert (from the
    /// reconciler's next pass) restarts it, so a crash-looping set does
    /// not silently burn resources.
    pub async fn sync(&self, set_type: &str) -> Result<(), ManagerError> {
        let _guard = self.locks.lock(set_type).await;

        let Some(existing) = self.table.get(set_type).map(|e| e.value().clone()) else {
            return Ok(());
        };
        if !existing.healthy {
            debug!(set_type, "Skipping sync of unhealthy daemon set");
            return Ok(());
        }

        match self.driver.list_tasks(&existing).await {
            Ok(tasks) => {
                if let Some(mut entry) = self.table.get_mut(set_type) {
                    entry.tasks = tasks;
                }
                Ok(())
            }
            Err(e) => {
                warn!(set_type, error = %e, "Daemon set liveness probe failed, respawning");
                self.respawn_locked(&existing.id, set_type, existing.config)
                    .await
                    .map(|_| ())
            }
        }
    }

    /// Stops and forgets the daemon set for `set_type`.
    ///
    /// Process termination is best-effort: a kill failure is logged and
    /// never blocks removal of the table entry.
    pub async fn remove(&self, set_type: &str) {
        let _guard = self.locks.lock(set_type).await;
        self.remove_locked(set_type).await;
    }

    /// Stops and forgets every managed daemon set.
    ///
    /// Takes every key's lock first so no concurrent upsert can race the
    /// teardown.
    pub async fn remove_all(&self) {
        let _guards = self.locks.lock_all().await;
        let types: Vec<String> = self.table.iter().map(|e| e.key().clone()).collect();
        for set_type in types {
            self.remove_locked(&set_type).await;
        }
    }

    /// Lists tasks on the running instance for `set_type`.
    pub async fn list_tasks(&self, set_type: &str) -> Result<Vec<DaemonTask>, ManagerError> {
        let entry = self.entry(set_type)?;
        let tasks = self.driver.list_tasks(&entry).await?;
        self.store_tasks(set_type, &tasks);
        Ok(tasks)
    }

    /// Assigns tasks to the running instance for `set_type`.
    pub async fn assign_tasks(
        &self,
        set_type: &str,
        tasks: &[DaemonTask],
    ) -> Result<Vec<DaemonTask>, ManagerError> {
        let entry = self.entry(set_type)?;
        let current = self.driver.assign_tasks(&entry, tasks).await?;
        self.store_tasks(set_type, &current);
        Ok(current)
    }

    /// Removes tasks from the running instance for `set_type`.
    pub async fn remove_tasks(
        &self,
        set_type: &str,
        task_ids: &[String],
    ) -> Result<Vec<DaemonTask>, ManagerError> {
        let entry = self.entry(set_type)?;
        let current = self.driver.remove_tasks(&entry, task_ids).await?;
        self.store_tasks(set_type, &current);
        Ok(current)
    }

    /// Types currently present in the table.
    pub fn known_types(&self) -> Vec<String> {
        self.table.iter().map(|e| e.key().clone()).collect()
    }

    /// Point-in-time report of every managed type for the reconciler.
    pub fn report(&self) -> Vec<DaemonSetReport> {
        self.table
            .iter()
            .map(|e| DaemonSetReport {
                daemon_set_id: e.id.clone(),
                set_type: e.set_type.clone(),
                config: e.config.clone(),
                healthy: e.healthy,
            })
            .collect()
    }

    /// Snapshot of one entry, for inspection.
    pub fn snapshot(&self, set_type: &str) -> Option<DaemonSet> {
        self.table.get(set_type).map(|e| e.value().clone())
    }

    fn entry(&self, set_type: &str) -> Result<DaemonSet, ManagerError> {
        self.table
            .get(set_type)
            .map(|e| e.value().clone())
            .ok_or_else(|| ManagerError::UnknownType(set_type.to_string()))
    }

    fn store_tasks(&self, set_type: &str, tasks: &[DaemonTask]) {
        if let Some(mut entry) = self.table.get_mut(set_type) {
            entry.tasks = tasks.to_vec();
        }
    }

    /// Full restart path; caller must hold the type's lock.
    async fn respawn_locked(
        &self,
        id: &str,
        set_type: &str,
        config: OperationalConfig,
    ) -> Result<Vec<DaemonTask>, ManagerError> {
        let binary =
            self.downloader
                .resolve(set_type, &config)
                .await
                .map_err(|e| ManagerError::Download {
                    set_type: set_type.to_string(),
                    message: e.to_string(),
                })?;

        if let Some((_, old)) = self.table.remove(set_type) {
            if let Err(e) = self.driver.stop(&old).await {
                warn!(set_type, error = %e, "Failed to stop old daemon set during replace");
            }
        }

        let mut daemon_set = DaemonSet::new(id, set_type, config);
        let server = match self.driver.start(&binary, &daemon_set).await {
            Ok(server) => server,
            Err(e) => {
                // Keep the entry so the next reconciliation pass retries
                // rather than forgetting the declared type.
                self.table.insert(set_type.to_string(), daemon_set);
                self.metrics.daemon_set_unhealthy(set_type);
                return Err(e.into());
            }
        };
        daemon_set.server_info = Some(server);

        match self.await_ready(&daemon_set).await {
            Some(tasks) => {
                daemon_set.healthy = true;
                daemon_set.tasks = tasks.clone();
                self.table.insert(set_type.to_string(), daemon_set);
                self.metrics.daemon_set_started(set_type);
                info!(set_type, id, "Daemon set healthy");
                Ok(tasks)
            }
            None => {
                daemon_set.healthy = false;
                self.table.insert(set_type.to_string(), daemon_set);
                self.metrics.daemon_set_unhealthy(set_type);
                Err(ManagerError::HealthCheckTimeout {
                    set_type: set_type.to_string(),
                    timeout: self.options.health_check_timeout,
                })
            }
        }
    }

    /// Polls the child's task-list endpoint until it answers or the
    /// health-check timeout elapses.
    async fn await_ready(&self, daemon_set: &DaemonSet) -> Option<Vec<DaemonTask>> {
        let probe = async {
            let mut interval = tokio::time::interval(self.options.health_check_interval);
            loop {
                interval.tick().await;
                match self.driver.list_tasks(daemon_set).await {
                    Ok(tasks) => return tasks,
                    Err(e) => {
                        debug!(
                            set_type = %daemon_set.set_type,
                            error = %e,
                            "Daemon set not ready yet"
                        );
                    }
                }
            }
        };

        tokio::time::timeout(self.options.health_check_timeout, probe)
            .await
            .ok()
    }

    async fn remove_locked(&self, set_type: &str) {
        let Some((_, daemon_set)) = self.table.remove(set_type) else {
            return;
        };
        if let Err(e) = self.driver.stop(&daemon_set).await {
            warn!(set_type, error = %e, "Failed to stop daemon set during removal");
        }
        self.metrics.daemon_set_removed(set_type);
        info!(set_type, "Daemon set removed");
    }
}
