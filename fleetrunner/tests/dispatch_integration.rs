//! Integration tests for the event-dispatch pipeline.
//!
//! These tests verify the complete poll → queue → worker → router →
//! status flow against a scripted control plane:
//! - End-to-end event execution and status payload shape
//! - Exactly-once claims under duplicate delivery
//! - Failure mapping to FAILED statuses
//! - Graceful shutdown draining in-flight work

use fleetrunner::api::client::{ApiFuture, ControlPlane};
use fleetrunner::api::types::{
    AcquireDaemonTasksRequest, DaemonSetReport, DaemonTask, ReconcileEntry, RunnerEvent,
    RunnerRequest, TaskResponse, TaskStatusCode,
};
use fleetrunner::dispatch::dispatcher::{DispatcherOptions, TaskDispatcher};
use fleetrunner::dispatch::router::{RouterError, RouterFuture, TaskRouter};
use fleetrunner::metrics::MetricsClient;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test Helpers
// =============================================================================

/// Control plane fake: replays scripted event batches and records every
/// reported status.
#[derive(Default)]
struct ScriptedPlane {
    batches: Mutex<VecDeque<Vec<RunnerEvent>>>,
    payloads: Mutex<HashMap<String, Vec<RunnerRequest>>>,
    statuses: Mutex<Vec<TaskResponse>>,
}

impl ScriptedPlane {
    fn push_batch(&self, events: Vec<RunnerEvent>) {
        self.batches.lock().unwrap().push_back(events);
    }

    fn set_payload(&self, task_id: &str, requests: Vec<RunnerRequest>) {
        self.payloads
            .lock()
            .unwrap()
            .insert(task_id.to_string(), requests);
    }

    fn statuses(&self) -> Vec<TaskResponse> {
        self.statuses.lock().unwrap().clone()
    }

    async fn wait_for_statuses(&self, count: usize, timeout: Duration) -> Vec<TaskResponse> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let statuses = self.statuses();
            if statuses.len() >= count {
                return statuses;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "expected {} statuses within {:?}, saw {}",
                    count,
                    timeout,
                    statuses.len()
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl ControlPlane for ScriptedPlane {
    fn acquire_events(&self) -> ApiFuture<'_, Vec<RunnerEvent>> {
        Box::pin(async move { Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default()) })
    }

    fn task_payload<'a>(&'a self, task_id: &'a str) -> ApiFuture<'a, Vec<RunnerRequest>> {
        Box::pin(async move {
            Ok(self
                .payloads
                .lock()
                .unwrap()
                .get(task_id)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn send_task_status<'a>(&'a self, response: &'a TaskResponse) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.statuses.lock().unwrap().push(response.clone());
            Ok(())
        })
    }

    fn reconcile<'a>(
        &'a self,
        _report: &'a [DaemonSetReport],
    ) -> ApiFuture<'a, Vec<ReconcileEntry>> {
        Box::pin(async move { Ok(Vec::new()) })
    }

    fn acquire_daemon_tasks<'a>(
        &'a self,
        _request: &'a AcquireDaemonTasksRequest,
    ) -> ApiFuture<'a, Vec<DaemonTask>> {
        Box::pin(async move { Ok(Vec::new()) })
    }

    fn register(&self) -> ApiFuture<'_, ()> {
        Box::pin(async move { Ok(()) })
    }

    fn heartbeat(&self) -> ApiFuture<'_, ()> {
        Box::pin(async move { Ok(()) })
    }
}

/// Router counting executions, with a configurable delay and failure
/// mode.
struct CountingRouter {
    executions: AtomicUsize,
    delay: Duration,
    fail_with: Option<String>,
}

impl CountingRouter {
    fn new(delay: Duration) -> Self {
        Self {
            executions: AtomicUsize::new(0),
            delay,
            fail_with: None,
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            executions: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail_with: Some(message.to_string()),
        }
    }

    fn count(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

impl TaskRouter for CountingRouter {
    fn handle<'a>(
        &'a self,
        _cancel: &'a CancellationToken,
        _request: &'a RunnerRequest,
    ) -> RouterFuture<'a> {
        Box::pin(async move {
            self.executions.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.fail_with {
                Some(message) => Err(RouterError::new(message.clone())),
                None => Ok(serde_json::json!({"ok": true})),
            }
        })
    }
}

fn event(task_id: &str) -> RunnerEvent {
    RunnerEvent {
        account_id: "acct".into(),
        task_id: task_id.into(),
        runner_type: "shell".into(),
        task_type: "run".into(),
    }
}

fn request(task_id: &str) -> RunnerRequest {
    RunnerRequest {
        task_id: task_id.into(),
        task_type: "run".into(),
        data: serde_json::json!({"cmd": "noop"}),
    }
}

fn fast_options() -> DispatcherOptions {
    DispatcherOptions {
        poll_interval: Duration::from_millis(20),
        poll_timeout: Duration::from_secs(5),
        queue_capacity: 16,
        worker_count: 4,
    }
}

// =============================================================================
// Integration Tests
// =============================================================================

#[tokio::test]
async fn end_to_end_event_execution() {
    let plane = Arc::new(ScriptedPlane::default());
    plane.push_batch(vec![event("t1")]);
    plane.set_payload("t1", vec![request("t1")]);

    let router = Arc::new(CountingRouter::new(Duration::ZERO));
    let dispatcher = TaskDispatcher::start(
        plane.clone(),
        router.clone(),
        MetricsClient::disabled(),
        fast_options(),
        CancellationToken::new(),
    );

    let statuses = plane.wait_for_statuses(1, Duration::from_secs(5)).await;
    dispatcher.shutdown().await;

    assert_eq!(router.count(), 1);
    assert_eq!(statuses[0].id, "t1");
    assert_eq!(statuses[0].code, TaskStatusCode::Ok);
    assert_eq!(statuses[0].data, serde_json::json!({"ok": true}));
    assert!(statuses[0].error.is_none());
}

#[tokio::test]
async fn duplicate_deliveries_execute_exactly_once() {
    let plane = Arc::new(ScriptedPlane::default());
    // Five copies of the same task delivered in one batch: the claim
    // set must admit exactly one worker while the others drop theirs.
    plane.push_batch(vec![
        event("t1"),
        event("t1"),
        event("t1"),
        event("t1"),
        event("t1"),
    ]);
    plane.set_payload("t1", vec![request("t1")]);

    let router = Arc::new(CountingRouter::new(Duration::from_millis(300)));
    let dispatcher = TaskDispatcher::start(
        plane.clone(),
        router.clone(),
        MetricsClient::disabled(),
        fast_options(),
        CancellationToken::new(),
    );
    let claims = dispatcher.claims();

    plane.wait_for_statuses(1, Duration::from_secs(5)).await;
    dispatcher.shutdown().await;

    assert_eq!(router.count(), 1, "duplicates must not execute");
    assert_eq!(plane.statuses().len(), 1);
    assert!(claims.is_empty(), "claim released after status report");
}

#[tokio::test]
async fn router_failure_reports_failed_status() {
    let plane = Arc::new(ScriptedPlane::default());
    plane.push_batch(vec![event("t2")]);
    plane.set_payload("t2", vec![request("t2")]);

    let router = Arc::new(CountingRouter::failing("handler exploded"));
    let dispatcher = TaskDispatcher::start(
        plane.clone(),
        router,
        MetricsClient::disabled(),
        fast_options(),
        CancellationToken::new(),
    );

    let statuses = plane.wait_for_statuses(1, Duration::from_secs(5)).await;
    dispatcher.shutdown().await;

    assert_eq!(statuses[0].code, TaskStatusCode::Failed);
    assert_eq!(statuses[0].error.as_deref(), Some("handler exploded"));
}

#[tokio::test]
async fn multi_request_payload_reports_each_request() {
    let plane = Arc::new(ScriptedPlane::default());
    plane.push_batch(vec![event("t3")]);
    plane.set_payload("t3", vec![request("t3"), request("t3")]);

    let router = Arc::new(CountingRouter::new(Duration::ZERO));
    let dispatcher = TaskDispatcher::start(
        plane.clone(),
        router.clone(),
        MetricsClient::disabled(),
        fast_options(),
        CancellationToken::new(),
    );

    plane.wait_for_statuses(2, Duration::from_secs(5)).await;
    dispatcher.shutdown().await;

    assert_eq!(router.count(), 2);
}

#[tokio::test]
async fn shutdown_drains_in_flight_work() {
    let plane = Arc::new(ScriptedPlane::default());
    plane.push_batch(vec![event("t4")]);
    plane.set_payload("t4", vec![request("t4")]);

    let router = Arc::new(CountingRouter::new(Duration::from_millis(300)));
    let dispatcher = TaskDispatcher::start(
        plane.clone(),
        router.clone(),
        MetricsClient::disabled(),
        fast_options(),
        CancellationToken::new(),
    );
    let claims = dispatcher.claims();

    // Let the worker claim the task and enter the router.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(claims.len(), 1, "task should be in flight");

    // Shutdown must block until the claimed task reports its status.
    dispatcher.shutdown().await;

    assert_eq!(plane.statuses().len(), 1, "in-flight task not abandoned");
    assert!(claims.is_empty());

    // No new claims after shutdown: queued batches are never polled.
    plane.push_batch(vec![event("t5")]);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(router.count(), 1);
    assert!(claims.is_empty());
}

#[tokio::test]
async fn empty_polls_produce_no_work() {
    let plane = Arc::new(ScriptedPlane::default());
    let router = Arc::new(CountingRouter::new(Duration::ZERO));
    let dispatcher = TaskDispatcher::start(
        plane.clone(),
        router.clone(),
        MetricsClient::disabled(),
        fast_options(),
        CancellationToken::new(),
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    dispatcher.shutdown().await;

    assert_eq!(router.count(), 0);
    assert!(plane.statuses().is_empty());
}
