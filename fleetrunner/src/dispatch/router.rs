//! Task routing seam.
//!
//! The dispatch pipeline hands each payload request to a [`TaskRouter`];
//! what a request actually does (container steps, secret operations, VM
//! provisioning) lives behind this trait, outside the engine.
//! [`HandlerRegistry`] is the standard implementation: a concurrent map
//! from task type to handler.

use crate::api::types::RunnerRequest;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Failure produced by a task handler.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RouterError {
    pub message: String,
}

impl RouterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Boxed future returned by router invocations.
pub type RouterFuture<'a> =
    Pin<Box<dyn Future<Output = Result<serde_json::Value, RouterError>> + Send + 'a>>;

/// Routes one payload request to its handler.
///
/// The cancellation token is the process-wide shutdown context; handlers
/// observe it to abort long-running work.
pub trait TaskRouter: Send + Sync {
    fn handle<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        request: &'a RunnerRequest,
    ) -> RouterFuture<'a>;
}

/// Handles requests of one task type.
pub trait TaskHandler: Send + Sync {
    fn handle<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        request: &'a RunnerRequest,
    ) -> RouterFuture<'a>;
}

/// Router dispatching by `task_type` to registered handlers.
///
/// An unregistered type produces a descriptive failure, which the worker
/// reports upstream as a `FAILED` status rather than dropping the task.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `task_type`, replacing any previous one.
    pub fn register(&self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_type.into(), handler);
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl TaskRouter for HandlerRegistry {
    fn handle<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        request: &'a RunnerRequest,
    ) -> RouterFuture<'a> {
        Box::pin(async move {
            let Some(handler) = self.handlers.get(&request.task_type).map(|h| Arc::clone(&h))
            else {
                return Err(RouterError::new(format!(
                    "no handler registered for task type '{}'",
                    request.task_type
                )));
            };
            handler.handle(cancel, request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    impl TaskHandler for EchoHandler {
        fn handle<'a>(
            &'a self,
            _cancel: &'a CancellationToken,
            request: &'a RunnerRequest,
        ) -> RouterFuture<'a> {
            Box::pin(async move { Ok(request.data.clone()) })
        }
    }

    fn request(task_type: &str) -> RunnerRequest {
        RunnerRequest {
            task_id: "t1".into(),
            task_type: task_type.into(),
            data: serde_json::json!({"ok": true}),
        }
    }

    #[tokio::test]
    async fn routes_to_registered_handler() {
        let registry = HandlerRegistry::new();
        registry.register("echo", Arc::new(EchoHandler));

        let cancel = CancellationToken::new();
        let body = registry.handle(&cancel, &request("echo")).await.unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn unknown_type_fails_descriptively() {
        let registry = HandlerRegistry::new();
        let cancel = CancellationToken::new();

        let err = registry.handle(&cancel, &request("vault")).await.unwrap_err();
        assert!(err.message.contains("vault"));
    }
}
