//! Metrics emission layer.
//!
//! [`MetricsClient`] is a fire-and-forget interface for recording metric
//! events. It is cheap to clone, never blocks, and silently drops events
//! when the aggregation daemon has shut down, so metrics can never stall
//! the dispatch pipeline.

use super::event::MetricEvent;
use std::time::Duration;
use tokio::sync::mpsc;

/// Client for emitting metric events to the metrics daemon.
///
/// A disabled client (see [`MetricsClient::disabled`]) swallows every
/// event; subsystems take the client unconditionally and need no
/// branching at call sites.
#[derive(Clone)]
pub struct MetricsClient {
    tx: Option<mpsc::UnboundedSender<MetricEvent>>,
}

impl MetricsClient {
    /// Creates a client feeding the given channel.
    pub fn new(tx: mpsc::UnboundedSender<MetricEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Creates a client that discards every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    #[inline]
    fn send(&self, event: MetricEvent) {
        if let Some(tx) = &self.tx {
            // Ignore send errors - the daemon may have shut down.
            let _ = tx.send(event);
        }
    }

    /// Records the size of one poll result.
    #[inline]
    pub fn events_polled(&self, count: usize) {
        self.send(MetricEvent::EventsPolled { count });
    }

    /// Records a router invocation starting.
    #[inline]
    pub fn task_started(&self) {
        self.send(MetricEvent::TaskStarted);
    }

    /// Records a router invocation completing successfully.
    #[inline]
    pub fn task_completed(&self, duration: Duration) {
        self.send(MetricEvent::TaskCompleted {
            duration_us: duration.as_micros() as u64,
        });
    }

    /// Records a router invocation failing.
    #[inline]
    pub fn task_failed(&self, duration: Duration) {
        self.send(MetricEvent::TaskFailed {
            duration_us: duration.as_micros() as u64,
        });
    }

    /// Records a duplicate event dropped by the claim set.
    #[inline]
    pub fn task_duplicate(&self) {
        self.send(MetricEvent::TaskDuplicate);
    }

    /// Records a task status delivered upstream.
    #[inline]
    pub fn status_reported(&self) {
        self.send(MetricEvent::StatusReported);
    }

    /// Records a daemon set passing its post-start health check.
    #[inline]
    pub fn daemon_set_started(&self, set_type: &str) {
        self.send(MetricEvent::DaemonSetStarted {
            set_type: set_type.to_string(),
        });
    }

    /// Records a daemon set being flagged unhealthy.
    #[inline]
    pub fn daemon_set_unhealthy(&self, set_type: &str) {
        self.send(MetricEvent::DaemonSetUnhealthy {
            set_type: set_type.to_string(),
        });
    }

    /// Records a daemon set being stopped and evicted.
    #[inline]
    pub fn daemon_set_removed(&self, set_type: &str) {
        self.send(MetricEvent::DaemonSetRemoved {
            set_type: set_type.to_string(),
        });
    }
}
