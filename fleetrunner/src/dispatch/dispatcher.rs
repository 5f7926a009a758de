//! Task dispatcher: producer/consumer pipeline over a bounded queue.
//!
//! ```text
//! ┌─────────────┐   bounded mpsc   ┌──────────────────┐
//! │ EventPoller │ ───────────────► │  DispatchWorker  │ × N
//! │ (producer)  │                  │  claim → route → │
//! └─────────────┘                  │  report status   │
//!                                  └──────────────────┘
//! ```
//!
//! Shutdown order: halt the producer (draining any in-flight poll), let
//! the dropped sender close the queue, then wait for every worker to
//! finish the remaining backlog. `shutdown` resolves only once all
//! in-flight claims have reported status, so callers can block on it
//! before process exit.

use super::claims::TaskClaims;
use super::poller::{EventPoller, PollerOptions};
use super::router::TaskRouter;
use super::worker::DispatchWorker;
use crate::api::client::ControlPlane;
use crate::metrics::MetricsClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default bounded queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default number of dispatch workers.
pub const DEFAULT_WORKER_COUNT: usize = 8;

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub queue_capacity: usize,
    pub worker_count: usize,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            poll_interval: super::poller::DEFAULT_POLL_INTERVAL,
            poll_timeout: super::poller::DEFAULT_POLL_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            worker_count: DEFAULT_WORKER_COUNT,
        }
    }
}

/// Owns the poller and the worker pool.
pub struct TaskDispatcher {
    stop_tx: watch::Sender<bool>,
    poller: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    claims: Arc<TaskClaims>,
}

impl TaskDispatcher {
    /// Starts the pipeline: one poller plus a fixed-size worker pool
    /// sharing a bounded queue.
    pub fn start(
        client: Arc<dyn ControlPlane>,
        router: Arc<dyn TaskRouter>,
        metrics: MetricsClient,
        options: DispatcherOptions,
        cancel: CancellationToken,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(options.queue_capacity.max(1));
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let (stop_tx, stop_rx) = watch::channel(false);
        let claims = Arc::new(TaskClaims::new());

        let poller = EventPoller::new(
            Arc::clone(&client),
            PollerOptions {
                interval: options.poll_interval,
                poll_timeout: options.poll_timeout,
            },
            metrics.clone(),
        )
        .spawn(queue_tx, stop_rx, cancel.clone());

        let workers = (0..options.worker_count.max(1))
            .map(|worker_id| {
                DispatchWorker {
                    worker_id,
                    client: Arc::clone(&client),
                    router: Arc::clone(&router),
                    claims: Arc::clone(&claims),
                    metrics: metrics.clone(),
                    cancel: cancel.clone(),
                }
                .spawn(Arc::clone(&queue_rx))
            })
            .collect();

        info!(
            workers = options.worker_count.max(1),
            queue_capacity = options.queue_capacity.max(1),
            "Task dispatcher started"
        );

        Self {
            stop_tx,
            poller,
            workers,
            claims,
        }
    }

    /// The shared claim set, for inspection.
    pub fn claims(&self) -> Arc<TaskClaims> {
        Arc::clone(&self.claims)
    }

    /// Gracefully drains the pipeline.
    ///
    /// Halts the producer first (no new polls are accepted, and any
    /// in-flight poll result is delivered), then waits for every worker
    /// to drain the closed queue. When this returns, no task is left
    /// mid-flight.
    pub async fn shutdown(self) {
        info!("Stopping task dispatcher");
        let _ = self.stop_tx.send(true);

        if let Err(e) = self.poller.await {
            warn!(error = %e, "Poller task join failed");
        }
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Worker task join failed");
            }
        }

        info!("Task dispatcher drained");
    }
}
