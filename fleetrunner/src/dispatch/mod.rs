//! Event polling and task dispatch.
//!
//! The dispatch pipeline turns control-plane work notifications into
//! executed tasks with reported statuses:
//!
//! poll → bounded queue → worker pool → task router → status report
//!
//! Exactly-once execution per task ID is enforced by [`TaskClaims`]; the
//! router behind [`TaskRouter`] decides what a request actually does.

pub mod claims;
pub mod dispatcher;
pub mod poller;
pub mod router;
pub mod worker;

pub use claims::TaskClaims;
pub use dispatcher::{
    DispatcherOptions, TaskDispatcher, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKER_COUNT,
};
pub use poller::{EventPoller, PollerOptions, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT};
pub use router::{HandlerRegistry, RouterError, RouterFuture, TaskHandler, TaskRouter};
pub use worker::{DispatchWorker, SharedEventQueue};
