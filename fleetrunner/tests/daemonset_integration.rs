//! Integration tests for daemon-set reconciliation.
//!
//! These tests drive full reconciliation passes against a scripted
//! control plane and a fake driver, verifying:
//! - Task-set convergence (assign missing, remove stale, keep common)
//! - Removal of locally running types the control plane stops declaring
//! - The skip-update flag leaving a type untouched
//! - A reconcile-endpoint failure aborting the whole pass

use fleetrunner::api::client::{ApiFuture, ControlPlane};
use fleetrunner::api::error::ApiError;
use fleetrunner::api::types::{
    AcquireDaemonTasksRequest, DaemonSetReport, DaemonTask, OperationalConfig, ReconcileEntry,
    RunnerEvent, RunnerRequest, TaskResponse,
};
use fleetrunner::daemonset::downloader::{DownloadFuture, ExecutableDownloader};
use fleetrunner::daemonset::driver::{DaemonSetDriver, DriverFuture};
use fleetrunner::daemonset::manager::{DaemonSetManager, ManagerOptions};
use fleetrunner::daemonset::reconcile_once;
use fleetrunner::daemonset::types::{DaemonSet, ServerInfo};
use fleetrunner::metrics::MetricsClient;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// Test Helpers
// =============================================================================

/// Driver fake tracking starts/stops and the per-type task lists.
struct FakeDriver {
    starts: Mutex<Vec<String>>,
    stops: Mutex<Vec<String>>,
    assigned: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    tasks: Mutex<Vec<DaemonTask>>,
    next_port: AtomicU16,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self {
            starts: Mutex::new(Vec::new()),
            stops: Mutex::new(Vec::new()),
            assigned: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            next_port: AtomicU16::new(15000),
        }
    }
}

impl FakeDriver {
    fn set_tasks(&self, ids: &[&str]) {
        *self.tasks.lock().unwrap() = ids.iter().map(|id| daemon_task(id)).collect();
    }

    fn task_ids(&self) -> Vec<String> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.task_id.clone())
            .collect()
    }
}

impl DaemonSetDriver for FakeDriver {
    fn start<'a>(
        &'a self,
        _binary: &'a Path,
        daemon_set: &'a DaemonSet,
    ) -> DriverFuture<'a, ServerInfo> {
        Box::pin(async move {
            self.starts.lock().unwrap().push(daemon_set.set_type.clone());
            let port = self.next_port.fetch_add(1, Ordering::SeqCst);
            Ok(ServerInfo {
                port,
                process: Arc::new(tokio::sync::Mutex::new(None)),
            })
        })
    }

    fn stop<'a>(&'a self, daemon_set: &'a DaemonSet) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            self.stops.lock().unwrap().push(daemon_set.set_type.clone());
            Ok(())
        })
    }

    fn list_tasks<'a>(&'a self, _daemon_set: &'a DaemonSet) -> DriverFuture<'a, Vec<DaemonTask>> {
        Box::pin(async move { Ok(self.tasks.lock().unwrap().clone()) })
    }

    fn assign_tasks<'a>(
        &'a self,
        _daemon_set: &'a DaemonSet,
        tasks: &'a [DaemonTask],
    ) -> DriverFuture<'a, Vec<DaemonTask>> {
        Box::pin(async move {
            let mut current = self.tasks.lock().unwrap();
            for task in tasks {
                self.assigned.lock().unwrap().push(task.task_id.clone());
                current.push(task.clone());
            }
            Ok(current.clone())
        })
    }

    fn remove_tasks<'a>(
        &'a self,
        _daemon_set: &'a DaemonSet,
        task_ids: &'a [String],
    ) -> DriverFuture<'a, Vec<DaemonTask>> {
        Box::pin(async move {
            let mut current = self.tasks.lock().unwrap();
            for id in task_ids {
                self.removed.lock().unwrap().push(id.clone());
                current.retain(|t| t.task_id != *id);
            }
            Ok(current.clone())
        })
    }
}

struct FakeDownloader;

impl ExecutableDownloader for FakeDownloader {
    fn resolve<'a>(
        &'a self,
        _set_type: &'a str,
        _config: &'a OperationalConfig,
    ) -> DownloadFuture<'a> {
        Box::pin(async move { Ok(PathBuf::from("/opt/daemons/ds-runner")) })
    }
}

/// Control plane fake replaying scripted desired-state lists.
#[derive(Default)]
struct ScriptedPlane {
    desired: Mutex<VecDeque<Result<Vec<ReconcileEntry>, ApiError>>>,
    reports: Mutex<Vec<Vec<DaemonSetReport>>>,
    acquire_requests: Mutex<Vec<AcquireDaemonTasksRequest>>,
}

impl ScriptedPlane {
    fn push_desired(&self, entries: Vec<ReconcileEntry>) {
        self.desired.lock().unwrap().push_back(Ok(entries));
    }

    fn push_failure(&self) {
        self.desired.lock().unwrap().push_back(Err(ApiError::Status {
            status: 503,
            path: "/api/daemons/runner-1/reconcile".into(),
        }));
    }
}

impl ControlPlane for ScriptedPlane {
    fn acquire_events(&self) -> ApiFuture<'_, Vec<RunnerEvent>> {
        Box::pin(async move { Ok(Vec::new()) })
    }

    fn task_payload<'a>(&'a self, _task_id: &'a str) -> ApiFuture<'a, Vec<RunnerRequest>> {
        Box::pin(async move { Ok(Vec::new()) })
    }

    fn send_task_status<'a>(&'a self, _response: &'a TaskResponse) -> ApiFuture<'a, ()> {
        Box::pin(async move { Ok(()) })
    }

    fn reconcile<'a>(
        &'a self,
        report: &'a [DaemonSetReport],
    ) -> ApiFuture<'a, Vec<ReconcileEntry>> {
        Box::pin(async move {
            self.reports.lock().unwrap().push(report.to_vec());
            self.desired
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        })
    }

    fn acquire_daemon_tasks<'a>(
        &'a self,
        request: &'a AcquireDaemonTasksRequest,
    ) -> ApiFuture<'a, Vec<DaemonTask>> {
        Box::pin(async move {
            self.acquire_requests.lock().unwrap().push(request.clone());
            Ok(request.task_ids.iter().map(|id| daemon_task(id)).collect())
        })
    }

    fn register(&self) -> ApiFuture<'_, ()> {
        Box::pin(async move { Ok(()) })
    }

    fn heartbeat(&self) -> ApiFuture<'_, ()> {
        Box::pin(async move { Ok(()) })
    }
}

fn daemon_task(id: &str) -> DaemonTask {
    DaemonTask {
        task_id: id.into(),
        task_type: "daemon".into(),
        params: serde_json::json!({"task": id}),
    }
}

fn config(version: &str) -> OperationalConfig {
    OperationalConfig {
        version: version.into(),
        executable: "ds-runner".into(),
        ..Default::default()
    }
}

fn entry(set_type: &str, id: &str, task_ids: &[&str]) -> ReconcileEntry {
    ReconcileEntry {
        daemon_set_id: id.into(),
        set_type: set_type.into(),
        config: config("1.0"),
        healthy: true,
        task_ids: task_ids.iter().map(|s| s.to_string()).collect(),
        skip_update: false,
    }
}

fn manager(driver: Arc<FakeDriver>) -> DaemonSetManager {
    DaemonSetManager::new(
        driver,
        Arc::new(FakeDownloader),
        ManagerOptions {
            health_check_interval: Duration::from_millis(5),
            health_check_timeout: Duration::from_millis(100),
        },
        MetricsClient::disabled(),
    )
}

// =============================================================================
// Integration Tests
// =============================================================================

#[tokio::test]
async fn converges_task_sets_against_desired_state() {
    let driver = Arc::new(FakeDriver::default());
    let manager = manager(Arc::clone(&driver));
    let plane = ScriptedPlane::default();

    // Local reality: type A runs tasks [d2, d3].
    driver.set_tasks(&["d2", "d3"]);
    manager.upsert("id-A", "A", config("1.0")).await.unwrap();

    // Desired: type A should run tasks [d1, d2].
    plane.push_desired(vec![entry("A", "id-A", &["d1", "d2"])]);

    reconcile_once(&manager, &plane).await.unwrap();

    // d3 removed, d1 acquired and assigned, d2 untouched.
    assert_eq!(*driver.removed.lock().unwrap(), vec!["d3".to_string()]);
    assert_eq!(*driver.assigned.lock().unwrap(), vec!["d1".to_string()]);
    let mut current = driver.task_ids();
    current.sort();
    assert_eq!(current, vec!["d1".to_string(), "d2".to_string()]);

    let acquires = plane.acquire_requests.lock().unwrap();
    assert_eq!(acquires.len(), 1);
    assert_eq!(acquires[0].set_type, "A");
    assert_eq!(acquires[0].task_ids, vec!["d1".to_string()]);
}

#[tokio::test]
async fn removes_types_no_longer_declared() {
    let driver = Arc::new(FakeDriver::default());
    let manager = manager(Arc::clone(&driver));
    let plane = ScriptedPlane::default();

    manager.upsert("id-A", "A", config("1.0")).await.unwrap();
    manager.upsert("id-B", "B", config("1.0")).await.unwrap();

    // Control plane now only declares A.
    plane.push_desired(vec![entry("A", "id-A", &[])]);

    reconcile_once(&manager, &plane).await.unwrap();

    let mut types = manager.known_types();
    types.sort();
    assert_eq!(types, vec!["A".to_string()]);
    assert_eq!(*driver.stops.lock().unwrap(), vec!["B".to_string()]);
}

#[tokio::test]
async fn skip_update_leaves_type_untouched() {
    let driver = Arc::new(FakeDriver::default());
    let manager = manager(Arc::clone(&driver));
    let plane = ScriptedPlane::default();

    let mut skipped = entry("A", "id-A", &["d1"]);
    skipped.skip_update = true;
    plane.push_desired(vec![skipped]);

    reconcile_once(&manager, &plane).await.unwrap();

    assert!(driver.starts.lock().unwrap().is_empty(), "skipUpdate must not upsert");
    assert!(manager.known_types().is_empty());
}

#[tokio::test]
async fn reconcile_endpoint_failure_aborts_pass() {
    let driver = Arc::new(FakeDriver::default());
    let manager = manager(Arc::clone(&driver));
    let plane = ScriptedPlane::default();

    manager.upsert("id-A", "A", config("1.0")).await.unwrap();
    let starts_before = driver.starts.lock().unwrap().len();
    plane.push_failure();

    let result = reconcile_once(&manager, &plane).await;
    assert!(result.is_err(), "endpoint failure must abort the pass");

    // Nothing was removed or restarted without desired state to diff.
    assert_eq!(manager.known_types(), vec!["A".to_string()]);
    assert_eq!(driver.starts.lock().unwrap().len(), starts_before);
    assert!(driver.stops.lock().unwrap().is_empty());
}

#[tokio::test]
async fn reconcile_reports_local_state_upstream() {
    let driver = Arc::new(FakeDriver::default());
    let manager = manager(Arc::clone(&driver));
    let plane = ScriptedPlane::default();

    manager.upsert("id-A", "A", config("1.0")).await.unwrap();
    plane.push_desired(vec![entry("A", "id-A", &[])]);

    reconcile_once(&manager, &plane).await.unwrap();

    let reports = plane.reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].len(), 1);
    assert_eq!(reports[0][0].set_type, "A");
    assert!(reports[0][0].healthy);
}

#[tokio::test]
async fn redeclared_identical_state_is_idempotent() {
    let driver = Arc::new(FakeDriver::default());
    let manager = manager(Arc::clone(&driver));
    let plane = ScriptedPlane::default();

    driver.set_tasks(&["d1"]);
    plane.push_desired(vec![entry("A", "id-1", &["d1"])]);
    plane.push_desired(vec![entry("A", "id-2", &["d1"])]);

    reconcile_once(&manager, &plane).await.unwrap();
    reconcile_once(&manager, &plane).await.unwrap();

    assert_eq!(
        driver.starts.lock().unwrap().len(),
        1,
        "identical redeclaration must not restart"
    );
    assert_eq!(manager.snapshot("A").unwrap().id, "id-2");
    assert!(driver.removed.lock().unwrap().is_empty());
}
