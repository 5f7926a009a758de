//! Runner runtime: composition and lifecycle.
//!
//! [`RunnerRuntime`] wires the engine together from configuration:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       RunnerRuntime                          │
//! │                                                              │
//! │  ┌────────────────┐   ┌─────────────────────┐                │
//! │  │ TaskDispatcher │   │ DaemonSetReconciler │   heartbeat    │
//! │  │ (poll/execute) │   │ (converge daemons)  │   loop         │
//! │  └───────┬────────┘   └──────────┬──────────┘                │
//! │          │                       │                           │
//! │          └──────► ControlPlaneClient ◄────────               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Shutdown is two-phase: first a soft drain (dispatcher stops claiming
//! and finishes in-flight work, reconciler stops, daemon sets are torn
//! down), then the operations token is cancelled so any straggling
//! network call aborts.

mod runner;

pub use runner::{install_shutdown_handler, RunnerRuntime, RuntimeError};
