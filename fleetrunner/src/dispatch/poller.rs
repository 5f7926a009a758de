//! Event poller: the producer half of the dispatch pipeline.
//!
//! On a fixed interval the poller asks the control plane for pending
//! runner events and pushes them onto the bounded queue. Two stop paths
//! exist:
//!
//! - **Hard cancellation** (process shutdown token): the poller exits at
//!   the next await point, even mid-enqueue against a full queue.
//! - **Soft stop** (dispatcher shutdown): the timer is halted and no new
//!   poll begins, but a poll already in flight completes and its events
//!   are delivered before the producer exits, so no in-flight poll result
//!   is silently dropped.
//!
//! On exit the queue sender is dropped, closing the queue so consumers
//! drain what remains and finish.

use crate::api::client::ControlPlane;
use crate::api::types::RunnerEvent;
use crate::metrics::MetricsClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default interval between event polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default per-poll timeout.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Poller tuning.
#[derive(Debug, Clone)]
pub struct PollerOptions {
    pub interval: Duration,
    pub poll_timeout: Duration,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Producer polling the control plane and feeding the event queue.
pub struct EventPoller {
    client: Arc<dyn ControlPlane>,
    options: PollerOptions,
    metrics: MetricsClient,
}

impl EventPoller {
    pub fn new(
        client: Arc<dyn ControlPlane>,
        options: PollerOptions,
        metrics: MetricsClient,
    ) -> Self {
        Self {
            client,
            options,
            metrics,
        }
    }

    /// Spawns the poll loop. The loop owns `queue_tx` and drops it on
    /// exit, which closes the queue for consumers.
    pub fn spawn(
        self,
        queue_tx: mpsc::Sender<RunnerEvent>,
        stop_rx: watch::Receiver<bool>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(queue_tx, stop_rx, cancel))
    }

    async fn run(
        self,
        queue_tx: mpsc::Sender<RunnerEvent>,
        mut stop_rx: watch::Receiver<bool>,
        cancel: CancellationToken,
    ) {
        info!(
            interval_ms = self.options.interval.as_millis(),
            "Event poller started"
        );

        let mut interval = tokio::time::interval(self.options.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = stop_rx.changed() => break,
                _ = interval.tick() => {
                    // A tick that raced the stop signal still runs to
                    // completion; the signal is honored at the next
                    // iteration. This is the soft-stop drain: an
                    // in-flight poll is never abandoned halfway.
                    if *stop_rx.borrow() {
                        break;
                    }
                    if !self.poll_once(&queue_tx, &cancel).await {
                        break;
                    }
                }
            }
        }

        info!("Event poller stopped");
        // queue_tx drops here, closing the queue for consumers.
    }

    /// One poll: fetch pending events and enqueue them.
    ///
    /// Returns `false` when the producer should exit (cancellation or a
    /// closed queue).
    async fn poll_once(
        &self,
        queue_tx: &mpsc::Sender<RunnerEvent>,
        cancel: &CancellationToken,
    ) -> bool {
        let events = match tokio::time::timeout(
            self.options.poll_timeout,
            self.client.acquire_events(),
        )
        .await
        {
            Ok(Ok(events)) => events,
            Ok(Err(e)) => {
                warn!(error = %e, "Event poll failed");
                return true;
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.options.poll_timeout.as_millis(),
                    "Event poll timed out"
                );
                return true;
            }
        };

        if events.is_empty() {
            return true;
        }

        debug!(count = events.len(), "Events received");
        self.metrics.events_polled(events.len());

        for event in events {
            // Never block past cancellation, even with a full queue.
            tokio::select! {
                _ = cancel.cancelled() => return false,
                sent = queue_tx.send(event) => {
                    if sent.is_err() {
                        return false;
                    }
                }
            }
        }
        true
    }
}
