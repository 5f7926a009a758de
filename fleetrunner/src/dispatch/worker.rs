//! Dispatch workers: the consumer half of the pipeline.
//!
//! A fixed pool of workers reads events from the bounded queue until it
//! closes. Per event: claim the task ID exactly once, fetch the
//! execution payload, invoke the task router per request, and report the
//! mapped status upstream with the bounded-retry policy. The claim is
//! released only after the status has been reported, whatever the
//! outcome.

use super::claims::TaskClaims;
use super::router::TaskRouter;
use crate::api::client::ControlPlane;
use crate::api::types::{RunnerEvent, RunnerRequest, TaskResponse};
use crate::metrics::MetricsClient;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Shared receiving side of the event queue.
///
/// Workers take turns awaiting the next event; the mutex serializes the
/// dequeue, not the processing.
pub type SharedEventQueue = Arc<Mutex<mpsc::Receiver<RunnerEvent>>>;

/// One worker in the dispatch pool.
pub struct DispatchWorker {
    pub worker_id: usize,
    pub client: Arc<dyn ControlPlane>,
    pub router: Arc<dyn TaskRouter>,
    pub claims: Arc<TaskClaims>,
    pub metrics: MetricsClient,
    pub cancel: CancellationToken,
}

impl DispatchWorker {
    /// Spawns the worker loop; it runs until the queue closes.
    pub fn spawn(self, queue: SharedEventQueue) -> JoinHandle<()> {
        tokio::spawn(self.run(queue))
    }

    async fn run(self, queue: SharedEventQueue) {
        debug!(worker_id = self.worker_id, "Dispatch worker started");

        loop {
            let event = {
                let mut rx = queue.lock().await;
                rx.recv().await
            };
            match event {
                Some(event) => self.handle_event(event).await,
                // Queue closed: producer is gone and the backlog is
                // drained.
                None => break,
            }
        }

        debug!(worker_id = self.worker_id, "Dispatch worker finished");
    }

    async fn handle_event(&self, event: RunnerEvent) {
        if !self.claims.claim(&event.task_id) {
            // Another worker (or a redelivery) is already handling it.
            debug!(task_id = %event.task_id, "Duplicate event dropped");
            self.metrics.task_duplicate();
            return;
        }

        self.execute(&event).await;
        self.claims.release(&event.task_id);
    }

    async fn execute(&self, event: &RunnerEvent) {
        let requests = match self.client.task_payload(&event.task_id).await {
            Ok(requests) => requests,
            Err(e) => {
                warn!(task_id = %event.task_id, error = %e, "Failed to fetch execution payload");
                let response = TaskResponse::failed(
                    &event.task_id,
                    format!("failed to fetch execution payload: {}", e),
                );
                self.report(&response).await;
                return;
            }
        };

        if requests.is_empty() {
            debug!(task_id = %event.task_id, "Execution payload carried no requests");
            return;
        }

        for request in &requests {
            let response = self.route(request).await;
            self.report(&response).await;
        }
    }

    /// Invokes the router once, with metrics emitted around the call.
    async fn route(&self, request: &RunnerRequest) -> TaskResponse {
        self.metrics.task_started();
        let started = Instant::now();
        let result = self.router.handle(&self.cancel, request).await;
        let duration = started.elapsed();

        match result {
            Ok(data) => {
                debug!(
                    task_id = %request.task_id,
                    task_type = %request.task_type,
                    duration_ms = duration.as_millis(),
                    "Request handled"
                );
                self.metrics.task_completed(duration);
                TaskResponse::ok(&request.task_id, data)
            }
            Err(e) => {
                warn!(
                    task_id = %request.task_id,
                    task_type = %request.task_type,
                    error = %e,
                    duration_ms = duration.as_millis(),
                    "Request failed"
                );
                self.metrics.task_failed(duration);
                TaskResponse::failed(&request.task_id, e.to_string())
            }
        }
    }

    async fn report(&self, response: &TaskResponse) {
        match self.client.send_task_status(response).await {
            Ok(()) => self.metrics.status_reported(),
            Err(e) => {
                // The claim is still released by the caller: the control
                // plane redelivers unacknowledged tasks.
                error!(task_id = %response.id, error = %e, "Task status lost after retries");
            }
        }
    }
}
