//! Control-plane communication layer.
//!
//! This module owns everything that crosses the wire to the control
//! plane: the transport abstraction, the retry/backoff policy, the wire
//! types, and the typed [`ControlPlane`] client consumed by the
//! dispatcher and the daemon-set reconciler.
//!
//! # Layers
//!
//! - [`http`] - raw transport ([`AsyncHttpClient`] trait + reqwest impl)
//! - [`backoff`] - exponential backoff bounded by elapsed time and a
//!   cancellation token
//! - [`types`] - JSON wire types (camelCase contract)
//! - [`client`] - endpoint methods with credential injection

pub mod backoff;
pub mod client;
pub mod error;
pub mod http;
pub mod types;

pub use backoff::{retry_with_backoff, ExponentialBackoff};
pub use client::{
    ApiFuture, ClientOptions, ControlPlane, ControlPlaneClient, StaticTokenProvider,
    TokenProvider,
};
pub use error::ApiError;
pub use http::{AsyncHttpClient, HttpMethod, HttpResponse, ReqwestClient};
pub use types::{
    AcquireDaemonTasksRequest, DaemonSetReport, DaemonTask, OperationalConfig, ReconcileEntry,
    RunnerEvent, RunnerIdentity, RunnerRequest, TaskResponse, TaskStatusCode,
};
