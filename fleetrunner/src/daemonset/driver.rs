//! Daemon-set execution driver.
//!
//! [`DaemonSetDriver`] abstracts spawning, stopping, and exchanging task
//! assignments with a daemon set's out-of-process server, so the manager
//! can be tested without real processes and other execution substrates
//! can be plugged in later. [`LocalProcessDriver`] is the local-process
//! implementation: it spawns the configured binary with an assigned
//! loopback port and proxies the child's plaintext control API.
//!
//! # Child control API
//!
//! - `GET  http://127.0.0.1:{port}/tasks` - list assigned tasks
//! - `POST http://127.0.0.1:{port}/tasks` - assign tasks (JSON array)
//! - `DELETE http://127.0.0.1:{port}/tasks?taskIds=a,b` - remove tasks
//!
//! Responses carry a structured `error` string field; a non-empty value
//! is a failure signal even when the HTTP status is 200.

use super::types::{DaemonSet, ServerInfo};
use crate::api::http::{AsyncHttpClient, HttpMethod};
use crate::api::types::DaemonTask;
use serde::Deserialize;
use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::atomic::{AtomicU16, Ordering};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Environment variable carrying the assigned control-API port.
pub const PORT_ENV_VAR: &str = "FLEETRUNNER_DAEMON_PORT";

/// First port handed to a spawned daemon set.
pub const DEFAULT_BASE_PORT: u16 = 14250;

/// Errors from driver operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The child process could not be spawned.
    #[error("failed to spawn daemon set '{set_type}': {source}")]
    Spawn {
        set_type: String,
        #[source]
        source: io::Error,
    },

    /// The daemon set has no live server handle.
    #[error("daemon set '{set_type}' has no running server")]
    NotRunning { set_type: String },

    /// The child's control API could not be reached or answered with a
    /// non-success status.
    #[error("daemon set '{set_type}' control API failed: {message}")]
    Api { set_type: String, message: String },

    /// The child answered but reported a structured error.
    #[error("daemon set '{set_type}' reported: {message}")]
    Child { set_type: String, message: String },

    /// The child could not be terminated.
    #[error("failed to stop daemon set '{set_type}': {message}")]
    Stop { set_type: String, message: String },
}

/// Boxed future returned by [`DaemonSetDriver`] methods.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DriverError>> + Send + 'a>>;

/// Abstraction over a daemon set's execution substrate.
///
/// `list`/`assign`/`remove` return the authoritative task list as the
/// child reports it after the operation.
pub trait DaemonSetDriver: Send + Sync {
    /// Spawns the daemon set's server process. Does not wait for the
    /// control API to become reachable; readiness is the manager's
    /// health-check concern.
    fn start<'a>(&'a self, binary: &'a Path, daemon_set: &'a DaemonSet)
        -> DriverFuture<'a, ServerInfo>;

    /// Terminates the process. Idempotent: a daemon set without a live
    /// handle is a no-op.
    fn stop<'a>(&'a self, daemon_set: &'a DaemonSet) -> DriverFuture<'a, ()>;

    /// Lists tasks currently assigned on the running instance.
    fn list_tasks<'a>(&'a self, daemon_set: &'a DaemonSet) -> DriverFuture<'a, Vec<DaemonTask>>;

    /// Assigns tasks to the running instance.
    fn assign_tasks<'a>(
        &'a self,
        daemon_set: &'a DaemonSet,
        tasks: &'a [DaemonTask],
    ) -> DriverFuture<'a, Vec<DaemonTask>>;

    /// Removes tasks from the running instance.
    fn remove_tasks<'a>(
        &'a self,
        daemon_set: &'a DaemonSet,
        task_ids: &'a [String],
    ) -> DriverFuture<'a, Vec<DaemonTask>>;
}

/// Body shape of every child control-API response.
#[derive(Debug, Deserialize)]
struct ChildTasksResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    tasks: Vec<DaemonTask>,
}

/// Driver that runs daemon sets as local child processes.
pub struct LocalProcessDriver<C: AsyncHttpClient> {
    http: C,
    next_port: AtomicU16,
}

impl<C: AsyncHttpClient> LocalProcessDriver<C> {
    /// Creates a driver allocating ports upward from `base_port`.
    ///
    /// Ports are never reused within one process lifetime, so a fast
    /// restart cannot race the old listener's close.
    pub fn new(http: C, base_port: u16) -> Self {
        Self {
            http,
            next_port: AtomicU16::new(base_port),
        }
    }

    fn allocate_port(&self) -> u16 {
        self.next_port.fetch_add(1, Ordering::SeqCst)
    }

    fn tasks_url(port: u16) -> String {
        format!("http://127.0.0.1:{}/tasks", port)
    }

    fn server_port(daemon_set: &DaemonSet) -> Result<u16, DriverError> {
        daemon_set
            .server_info
            .as_ref()
            .map(|s| s.port)
            .ok_or_else(|| DriverError::NotRunning {
                set_type: daemon_set.set_type.clone(),
            })
    }

    async fn tasks_call(
        &self,
        daemon_set: &DaemonSet,
        method: HttpMethod,
        url: String,
        body: Option<String>,
    ) -> Result<Vec<DaemonTask>, DriverError> {
        let set_type = daemon_set.set_type.clone();

        let response = self
            .http
            .request(method, &url, &[], body)
            .await
            .map_err(|e| DriverError::Api {
                set_type: set_type.clone(),
                message: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(DriverError::Api {
                set_type,
                message: format!("HTTP {} from {}", response.status, url),
            });
        }

        let decoded: ChildTasksResponse =
            serde_json::from_slice(&response.body).map_err(|e| DriverError::Api {
                set_type: set_type.clone(),
                message: format!("invalid response body: {}", e),
            })?;

        // The child signals failure in-band even on HTTP 200.
        if !decoded.error.is_empty() {
            return Err(DriverError::Child {
                set_type,
                message: decoded.error,
            });
        }
        Ok(decoded.tasks)
    }
}

impl<C: AsyncHttpClient> DaemonSetDriver for LocalProcessDriver<C> {
    fn start<'a>(
        &'a self,
        binary: &'a Path,
        daemon_set: &'a DaemonSet,
    ) -> DriverFuture<'a, ServerInfo> {
        Box::pin(async move {
            let port = self.allocate_port();

            let mut command = Command::new(binary);
            command
                .envs(daemon_set.config.env.iter())
                .env(PORT_ENV_VAR, port.to_string())
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true);

            let child = command.spawn().map_err(|source| DriverError::Spawn {
                set_type: daemon_set.set_type.clone(),
                source,
            })?;

            info!(
                set_type = %daemon_set.set_type,
                port,
                pid = ?child.id(),
                binary = %binary.display(),
                "Daemon set process started"
            );

            Ok(ServerInfo::new(port, child))
        })
    }

    fn stop<'a>(&'a self, daemon_set: &'a DaemonSet) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            let Some(server) = daemon_set.server_info.as_ref() else {
                debug!(set_type = %daemon_set.set_type, "Stop requested with no live handle");
                return Ok(());
            };

            let mut slot = server.process.lock().await;
            let Some(mut child) = slot.take() else {
                return Ok(());
            };

            match child.start_kill() {
                Ok(()) => {}
                // Already exited; reap below.
                Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
                Err(e) => {
                    return Err(DriverError::Stop {
                        set_type: daemon_set.set_type.clone(),
                        message: e.to_string(),
                    });
                }
            }

            match child.wait().await {
                Ok(status) => {
                    info!(
                        set_type = %daemon_set.set_type,
                        port = server.port,
                        exit = ?status.code(),
                        "Daemon set process stopped"
                    );
                    Ok(())
                }
                Err(e) => Err(DriverError::Stop {
                    set_type: daemon_set.set_type.clone(),
                    message: e.to_string(),
                }),
            }
        })
    }

    fn list_tasks<'a>(&'a self, daemon_set: &'a DaemonSet) -> DriverFuture<'a, Vec<DaemonTask>> {
        Box::pin(async move {
            let port = Self::server_port(daemon_set)?;
            self.tasks_call(daemon_set, HttpMethod::Get, Self::tasks_url(port), None)
                .await
        })
    }

    fn assign_tasks<'a>(
        &'a self,
        daemon_set: &'a DaemonSet,
        tasks: &'a [DaemonTask],
    ) -> DriverFuture<'a, Vec<DaemonTask>> {
        Box::pin(async move {
            let port = Self::server_port(daemon_set)?;
            let body = serde_json::to_string(tasks).map_err(|e| DriverError::Api {
                set_type: daemon_set.set_type.clone(),
                message: format!("failed to encode tasks: {}", e),
            })?;
            self.tasks_call(
                daemon_set,
                HttpMethod::Post,
                Self::tasks_url(port),
                Some(body),
            )
            .await
        })
    }

    fn remove_tasks<'a>(
        &'a self,
        daemon_set: &'a DaemonSet,
        task_ids: &'a [String],
    ) -> DriverFuture<'a, Vec<DaemonTask>> {
        Box::pin(async move {
            let port = Self::server_port(daemon_set)?;
            if task_ids.is_empty() {
                warn!(set_type = %daemon_set.set_type, "Remove called with no task IDs");
            }
            let url = format!("{}?taskIds={}", Self::tasks_url(port), task_ids.join(","));
            self.tasks_call(daemon_set, HttpMethod::Delete, url, None)
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::http::tests::MockHttpClient;
    use crate::api::http::HttpResponse;
    use crate::api::types::OperationalConfig;
    use crate::daemonset::types::ServerInfo;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn running_set(port: u16) -> DaemonSet {
        let mut ds = DaemonSet::new("id-1", "secrets", OperationalConfig::default());
        ds.server_info = Some(ServerInfo {
            port,
            process: Arc::new(Mutex::new(None)),
        });
        ds
    }

    fn task(id: &str) -> DaemonTask {
        DaemonTask {
            task_id: id.into(),
            task_type: String::new(),
            params: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn list_hits_child_tasks_endpoint() {
        let mock = MockHttpClient::ok(r#"{"error":"","tasks":[{"taskId":"d1"}]}"#);
        let driver = LocalProcessDriver::new(mock, DEFAULT_BASE_PORT);
        let ds = running_set(15000);

        let tasks = driver.list_tasks(&ds).await.unwrap();
        assert_eq!(tasks, vec![task("d1")]);

        let requests = driver.http.requests.lock().unwrap();
        assert_eq!(requests[0].url, "http://127.0.0.1:15000/tasks");
        assert_eq!(requests[0].method, HttpMethod::Get);
    }

    #[tokio::test]
    async fn error_field_fails_even_on_http_200() {
        let mock = MockHttpClient::ok(r#"{"error":"task d9 unknown","tasks":[]}"#);
        let driver = LocalProcessDriver::new(mock, DEFAULT_BASE_PORT);
        let ds = running_set(15000);

        let err = driver.list_tasks(&ds).await.unwrap_err();
        match err {
            DriverError::Child { message, .. } => assert_eq!(message, "task d9 unknown"),
            other => panic!("expected child error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn http_failure_is_an_api_error() {
        let mock = MockHttpClient::new(vec![Ok(HttpResponse {
            status: 500,
            body: Vec::new(),
        })]);
        let driver = LocalProcessDriver::new(mock, DEFAULT_BASE_PORT);
        let ds = running_set(15000);

        let err = driver.list_tasks(&ds).await.unwrap_err();
        assert!(matches!(err, DriverError::Api { .. }));
    }

    #[tokio::test]
    async fn remove_encodes_task_ids_query() {
        let mock = MockHttpClient::ok(r#"{"error":"","tasks":[]}"#);
        let driver = LocalProcessDriver::new(mock, DEFAULT_BASE_PORT);
        let ds = running_set(15000);

        driver
            .remove_tasks(&ds, &["d1".into(), "d2".into()])
            .await
            .unwrap();

        let requests = driver.http.requests.lock().unwrap();
        assert_eq!(
            requests[0].url,
            "http://127.0.0.1:15000/tasks?taskIds=d1,d2"
        );
        assert_eq!(requests[0].method, HttpMethod::Delete);
    }

    #[tokio::test]
    async fn assign_posts_task_array() {
        let mock = MockHttpClient::ok(r#"{"error":"","tasks":[{"taskId":"d1"}]}"#);
        let driver = LocalProcessDriver::new(mock, DEFAULT_BASE_PORT);
        let ds = running_set(15000);

        driver.assign_tasks(&ds, &[task("d1")]).await.unwrap();

        let requests = driver.http.requests.lock().unwrap();
        assert_eq!(requests[0].method, HttpMethod::Post);
        let body: serde_json::Value =
            serde_json::from_str(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body[0]["taskId"], "d1");
    }

    #[tokio::test]
    async fn calls_without_server_fail_descriptively() {
        let mock = MockHttpClient::ok("{}");
        let driver = LocalProcessDriver::new(mock, DEFAULT_BASE_PORT);
        let ds = DaemonSet::new("id-1", "secrets", OperationalConfig::default());

        let err = driver.list_tasks(&ds).await.unwrap_err();
        assert!(matches!(err, DriverError::NotRunning { .. }));
        assert_eq!(driver.http.request_count(), 0);
    }

    #[tokio::test]
    async fn stop_without_handle_is_noop() {
        let mock = MockHttpClient::ok("{}");
        let driver = LocalProcessDriver::new(mock, DEFAULT_BASE_PORT);
        let ds = DaemonSet::new("id-1", "secrets", OperationalConfig::default());

        driver.stop(&ds).await.unwrap();
    }

    #[test]
    fn ports_increase_monotonically() {
        let driver = LocalProcessDriver::new(MockHttpClient::ok("{}"), 14250);
        assert_eq!(driver.allocate_port(), 14250);
        assert_eq!(driver.allocate_port(), 14251);
        assert_eq!(driver.allocate_port(), 14252);
    }
}
