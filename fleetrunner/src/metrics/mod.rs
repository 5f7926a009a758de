//! Metrics collection for the runner.
//!
//! Two layers, decoupled by an unbounded channel:
//!
//! 1. **Emission** ([`MetricsClient`]) - fire-and-forget, cheap to
//!    clone, used by the dispatch workers and the daemon-set manager.
//! 2. **Aggregation** ([`MetricsSystem`]) - an independent task folding
//!    events into counters, readable as a [`MetricsSnapshot`].
//!
//! Emission never blocks and never fails; a runner configured without
//! metrics uses [`MetricsClient::disabled`] and every call site stays
//! unchanged.

mod client;
mod daemon;
mod event;

pub use client::MetricsClient;
pub use daemon::{MetricsSnapshot, MetricsSystem};
pub use event::MetricEvent;
