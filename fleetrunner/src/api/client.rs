//! Typed client for the control-plane HTTP API.
//!
//! All calls inject bearer credentials, encode/decode JSON, and honor the
//! process-wide cancellation token. Idempotent calls go through the shared
//! backoff helper; status submission additionally runs its own bounded
//! outer retry loop because losing a task status is operationally
//! unacceptable.

use super::backoff::{retry_with_backoff, ExponentialBackoff};
use super::error::ApiError;
use super::http::{AsyncHttpClient, HttpMethod, HttpResponse};
use super::types::{
    AcquireDaemonTasksRequest, DaemonSetReport, DaemonTask, ReconcileEntry, RegisterRequest,
    RunnerEvent, RunnerIdentity, RunnerRequest, TaskResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Boxed future returned by [`ControlPlane`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Supplies the bearer token attached to every control-plane call.
///
/// Token generation is outside this crate; implementations may cache or
/// mint per call.
pub trait TokenProvider: Send + Sync {
    /// Current bearer token.
    fn token(&self) -> Result<String, ApiError>;

    /// Hash identifying the token, sent as `delegateTokenHash`.
    fn token_hash(&self) -> String;
}

/// Token provider backed by a fixed token string.
pub struct StaticTokenProvider {
    token: String,
    hash: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            hash: hash.into(),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn token(&self) -> Result<String, ApiError> {
        Ok(self.token.clone())
    }

    fn token_hash(&self) -> String {
        self.hash.clone()
    }
}

/// Retry tuning for the client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Initial backoff interval for retryable errors.
    pub backoff_initial: Duration,
    /// Cap on a single backoff interval.
    pub backoff_max_interval: Duration,
    /// Bound on total time spent retrying one call.
    pub backoff_max_elapsed: Duration,
    /// Outer attempt count for status submission.
    pub status_retry_attempts: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            backoff_initial: super::backoff::DEFAULT_INITIAL_INTERVAL,
            backoff_max_interval: super::backoff::DEFAULT_MAX_INTERVAL,
            backoff_max_elapsed: super::backoff::DEFAULT_MAX_ELAPSED,
            status_retry_attempts: 5,
        }
    }
}

/// Control-plane operations consumed by the dispatcher and reconciler.
///
/// Object-safe so subsystems can hold `Arc<dyn ControlPlane>` and tests
/// can substitute a scripted fake.
pub trait ControlPlane: Send + Sync {
    /// Polls for pending runner events.
    fn acquire_events(&self) -> ApiFuture<'_, Vec<RunnerEvent>>;

    /// Fetches the execution payload for a claimed task.
    fn task_payload<'a>(&'a self, task_id: &'a str) -> ApiFuture<'a, Vec<RunnerRequest>>;

    /// Reports a task's terminal status. Retried beyond the normal
    /// backoff policy; see [`ClientOptions::status_retry_attempts`].
    fn send_task_status<'a>(&'a self, response: &'a TaskResponse) -> ApiFuture<'a, ()>;

    /// Reports local daemon-set state and receives desired state back.
    fn reconcile<'a>(
        &'a self,
        report: &'a [DaemonSetReport],
    ) -> ApiFuture<'a, Vec<ReconcileEntry>>;

    /// Acquires parameters for newly desired daemon tasks.
    fn acquire_daemon_tasks<'a>(
        &'a self,
        request: &'a AcquireDaemonTasksRequest,
    ) -> ApiFuture<'a, Vec<DaemonTask>>;

    /// Announces this runner to the control plane.
    fn register(&self) -> ApiFuture<'_, ()>;

    /// Keep-alive ping.
    fn heartbeat(&self) -> ApiFuture<'_, ()>;
}

/// HTTP implementation of [`ControlPlane`].
pub struct ControlPlaneClient<C: AsyncHttpClient> {
    http: C,
    base_url: String,
    identity: RunnerIdentity,
    tokens: Arc<dyn TokenProvider>,
    options: ClientOptions,
    cancel: CancellationToken,
}

impl<C: AsyncHttpClient> ControlPlaneClient<C> {
    /// Creates a client bound to `cancel`; every call aborts when the
    /// token fires.
    pub fn new(
        http: C,
        base_url: impl Into<String>,
        identity: RunnerIdentity,
        tokens: Arc<dyn TokenProvider>,
        options: ClientOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            identity,
            tokens,
            options,
            cancel,
        }
    }

    fn policy(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            self.options.backoff_initial,
            self.options.backoff_max_interval,
            self.options.backoff_max_elapsed,
        )
    }

    fn auth_headers(&self) -> Result<Vec<(&'static str, String)>, ApiError> {
        let token = self.tokens.token()?;
        Ok(vec![
            ("Authorization", format!("Delegate {}", token)),
            ("delegateTokenHash", self.tokens.token_hash()),
        ])
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }

    /// One request, with credentials attached and the status mapped.
    async fn request_once(
        &self,
        method: HttpMethod,
        path_and_query: &str,
        body: Option<&str>,
    ) -> Result<HttpResponse, ApiError> {
        let headers = self.auth_headers()?;
        let response = self
            .http
            .request(
                method,
                &self.url(path_and_query),
                &headers,
                body.map(|b| b.to_string()),
            )
            .await?;

        if !response.is_success() {
            return Err(ApiError::Status {
                status: response.status,
                path: path_and_query.to_string(),
            });
        }
        Ok(response)
    }

    /// Retried request returning a decoded JSON body.
    async fn call<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path_and_query: String,
        body: Option<String>,
    ) -> Result<T, ApiError> {
        let response = retry_with_backoff(self.policy(), &self.cancel, || {
            self.request_once(method, &path_and_query, body.as_deref())
        })
        .await?;

        serde_json::from_slice(&response.body).map_err(|e| ApiError::Decode {
            path: path_and_query.clone(),
            message: e.to_string(),
        })
    }

    /// Retried request whose response body is drained and discarded.
    async fn call_unit(
        &self,
        method: HttpMethod,
        path_and_query: String,
        body: Option<String>,
    ) -> Result<(), ApiError> {
        retry_with_backoff(self.policy(), &self.cancel, || {
            self.request_once(method, &path_and_query, body.as_deref())
        })
        .await
        .map(|_| ())
    }

    fn encode<T: Serialize>(&self, path: &str, value: &T) -> Result<String, ApiError> {
        serde_json::to_string(value).map_err(|e| ApiError::Encode {
            path: path.to_string(),
            message: e.to_string(),
        })
    }
}

impl<C: AsyncHttpClient> ControlPlane for ControlPlaneClient<C> {
    fn acquire_events(&self) -> ApiFuture<'_, Vec<RunnerEvent>> {
        Box::pin(async move {
            let path = format!(
                "/api/executions/{}/runner-events?accountId={}",
                self.identity.runner_id, self.identity.account_id
            );
            self.call(HttpMethod::Post, path, None).await
        })
    }

    fn task_payload<'a>(&'a self, task_id: &'a str) -> ApiFuture<'a, Vec<RunnerRequest>> {
        Box::pin(async move {
            let path = format!(
                "/api/executions/{}/request?delegateId={}&accountId={}&delegateInstanceId={}&delegateName={}",
                task_id,
                self.identity.runner_id,
                self.identity.account_id,
                self.identity.instance_id,
                self.identity.runner_name
            );
            self.call(HttpMethod::Get, path, None).await
        })
    }

    fn send_task_status<'a>(&'a self, response: &'a TaskResponse) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let path = format!(
                "/api/executions/{}/task-response?runnerId={}&accountId={}",
                response.id, self.identity.runner_id, self.identity.account_id
            );
            let body = self.encode(&path, response)?;

            // Outer bounded retry on top of the backoff policy: a lost
            // status leaves the task stuck on the control plane side.
            let mut last = ApiError::Cancelled;
            for attempt in 1..=self.options.status_retry_attempts.max(1) {
                match self
                    .call_unit(HttpMethod::Post, path.clone(), Some(body.clone()))
                    .await
                {
                    Ok(()) => {
                        debug!(task_id = %response.id, attempt, "Task status delivered");
                        return Ok(());
                    }
                    Err(ApiError::Cancelled) => return Err(ApiError::Cancelled),
                    Err(e) => {
                        warn!(
                            task_id = %response.id,
                            attempt,
                            attempts = self.options.status_retry_attempts,
                            error = %e,
                            "Task status submission failed"
                        );
                        last = e;
                    }
                }
            }
            Err(last)
        })
    }

    fn reconcile<'a>(
        &'a self,
        report: &'a [DaemonSetReport],
    ) -> ApiFuture<'a, Vec<ReconcileEntry>> {
        Box::pin(async move {
            let path = format!(
                "/api/daemons/{}/reconcile?accountId={}",
                self.identity.runner_id, self.identity.account_id
            );
            let body = self.encode(&path, &report)?;
            self.call(HttpMethod::Post, path, Some(body)).await
        })
    }

    fn acquire_daemon_tasks<'a>(
        &'a self,
        request: &'a AcquireDaemonTasksRequest,
    ) -> ApiFuture<'a, Vec<DaemonTask>> {
        Box::pin(async move {
            let path = format!(
                "/api/daemons/{}/tasks?accountId={}",
                self.identity.runner_id, self.identity.account_id
            );
            let body = self.encode(&path, request)?;
            self.call(HttpMethod::Post, path, Some(body)).await
        })
    }

    fn register(&self) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            let path = format!("/api/runners/register?accountId={}", self.identity.account_id);
            let request = RegisterRequest {
                runner_id: self.identity.runner_id.clone(),
                runner_name: self.identity.runner_name.clone(),
                instance_id: self.identity.instance_id.clone(),
                version: crate::VERSION.to_string(),
            };
            let body = self.encode(&path, &request)?;
            self.call_unit(HttpMethod::Post, path, Some(body)).await
        })
    }

    fn heartbeat(&self) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            let path = format!(
                "/api/runners/{}/heartbeat?accountId={}",
                self.identity.runner_id, self.identity.account_id
            );
            self.call_unit(HttpMethod::Post, path, None).await
        })
    }
}
