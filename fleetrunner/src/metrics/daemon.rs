//! Metrics aggregation layer.
//!
//! [`MetricsDaemon`] is an independent task that drains the event
//! channel and folds events into atomic counters. [`MetricsSystem`]
//! bundles the daemon with its client and exposes point-in-time
//! snapshots.

use super::client::MetricsClient;
use super::event::MetricEvent;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Aggregated counters, updated only by the daemon task.
#[derive(Default)]
struct Counters {
    events_polled: AtomicU64,
    tasks_started: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_duplicate: AtomicU64,
    tasks_running: AtomicI64,
    statuses_reported: AtomicU64,
    total_task_duration_us: AtomicU64,
    daemon_sets_started: AtomicU64,
    daemon_sets_unhealthy: AtomicU64,
    daemon_sets_removed: AtomicU64,
}

/// A point-in-time snapshot of aggregated metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_polled: u64,
    pub tasks_started: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_duplicate: u64,
    pub tasks_running: i64,
    pub statuses_reported: u64,
    pub total_task_duration_us: u64,
    pub daemon_sets_started: u64,
    pub daemon_sets_unhealthy: u64,
    pub daemon_sets_removed: u64,
}

impl MetricsSnapshot {
    /// Mean router invocation time across completed and failed tasks.
    pub fn average_task_duration_us(&self) -> u64 {
        let finished = self.tasks_completed + self.tasks_failed;
        if finished == 0 {
            0
        } else {
            self.total_task_duration_us / finished
        }
    }
}

/// Background task folding metric events into counters.
struct MetricsDaemon {
    rx: mpsc::UnboundedReceiver<MetricEvent>,
    counters: Arc<Counters>,
}

impl MetricsDaemon {
    async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.rx.recv() => {
                    match event {
                        Some(event) => self.apply(event),
                        None => break,
                    }
                }
            }
        }
        debug!("Metrics daemon stopped");
    }

    fn apply(&self, event: MetricEvent) {
        let c = &self.counters;
        match event {
            MetricEvent::EventsPolled { count } => {
                c.events_polled.fetch_add(count as u64, Ordering::Relaxed);
            }
            MetricEvent::TaskStarted => {
                c.tasks_started.fetch_add(1, Ordering::Relaxed);
                c.tasks_running.fetch_add(1, Ordering::Relaxed);
            }
            MetricEvent::TaskCompleted { duration_us } => {
                c.tasks_completed.fetch_add(1, Ordering::Relaxed);
                c.tasks_running.fetch_sub(1, Ordering::Relaxed);
                c.total_task_duration_us
                    .fetch_add(duration_us, Ordering::Relaxed);
            }
            MetricEvent::TaskFailed { duration_us } => {
                c.tasks_failed.fetch_add(1, Ordering::Relaxed);
                c.tasks_running.fetch_sub(1, Ordering::Relaxed);
                c.total_task_duration_us
                    .fetch_add(duration_us, Ordering::Relaxed);
            }
            MetricEvent::TaskDuplicate => {
                c.tasks_duplicate.fetch_add(1, Ordering::Relaxed);
            }
            MetricEvent::StatusReported => {
                c.statuses_reported.fetch_add(1, Ordering::Relaxed);
            }
            MetricEvent::DaemonSetStarted { .. } => {
                c.daemon_sets_started.fetch_add(1, Ordering::Relaxed);
            }
            MetricEvent::DaemonSetUnhealthy { .. } => {
                c.daemon_sets_unhealthy.fetch_add(1, Ordering::Relaxed);
            }
            MetricEvent::DaemonSetRemoved { .. } => {
                c.daemon_sets_removed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// The metrics system: daemon task plus its emission client.
pub struct MetricsSystem {
    client: MetricsClient,
    counters: Arc<Counters>,
    handle: JoinHandle<()>,
}

impl MetricsSystem {
    /// Starts the aggregation daemon. It runs until `cancel` fires or
    /// every client clone has been dropped.
    pub fn start(cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let daemon = MetricsDaemon {
            rx,
            counters: Arc::clone(&counters),
        };
        let handle = tokio::spawn(daemon.run(cancel));

        Self {
            client: MetricsClient::new(tx),
            counters,
            handle,
        }
    }

    /// A client for emitting events; clone freely.
    pub fn client(&self) -> MetricsClient {
        self.client.clone()
    }

    /// Reads the current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.counters;
        MetricsSnapshot {
            events_polled: c.events_polled.load(Ordering::Relaxed),
            tasks_started: c.tasks_started.load(Ordering::Relaxed),
            tasks_completed: c.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: c.tasks_failed.load(Ordering::Relaxed),
            tasks_duplicate: c.tasks_duplicate.load(Ordering::Relaxed),
            tasks_running: c.tasks_running.load(Ordering::Relaxed),
            statuses_reported: c.statuses_reported.load(Ordering::Relaxed),
            total_task_duration_us: c.total_task_duration_us.load(Ordering::Relaxed),
            daemon_sets_started: c.daemon_sets_started.load(Ordering::Relaxed),
            daemon_sets_unhealthy: c.daemon_sets_unhealthy.load(Ordering::Relaxed),
            daemon_sets_removed: c.daemon_sets_removed.load(Ordering::Relaxed),
        }
    }

    /// Waits for the daemon to drain after its clients are gone or the
    /// cancellation token has fired.
    pub async fn shutdown(self) {
        drop(self.client);
        let _ = self.handle.await;
    }
}
