//! Runtime construction and lifecycle management.

use crate::api::client::{
    ClientOptions, ControlPlane, ControlPlaneClient, StaticTokenProvider, TokenProvider,
};
use crate::api::error::ApiError;
use crate::api::http::ReqwestClient;
use crate::api::types::RunnerIdentity;
use crate::config::ConfigFile;
use crate::daemonset::downloader::{DirectoryDownloader, ExecutableDownloader};
use crate::daemonset::driver::LocalProcessDriver;
use crate::daemonset::manager::{DaemonSetManager, ManagerOptions};
use crate::daemonset::reconciler::{DaemonSetReconciler, ReconcilerOptions};
use crate::dispatch::dispatcher::{DispatcherOptions, TaskDispatcher};
use crate::dispatch::router::TaskRouter;
use crate::metrics::{MetricsSnapshot, MetricsSystem};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Errors from runtime startup.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Registration or client construction failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// The composed runner: dispatcher, reconciler, heartbeat, metrics.
pub struct RunnerRuntime {
    dispatcher: TaskDispatcher,
    reconciler: DaemonSetReconciler,
    manager: Arc<DaemonSetManager>,
    metrics: MetricsSystem,
    heartbeat: JoinHandle<()>,
    shutdown_requested: CancellationToken,
    ops_cancel: CancellationToken,
}

impl RunnerRuntime {
    /// Builds the engine from configuration, registers with the control
    /// plane (retried with backoff), and starts every subsystem.
    ///
    /// `shutdown_requested` signals intent to stop; network operations
    /// keep running during the drain and are only hard-cancelled at the
    /// end of [`shutdown`](Self::shutdown).
    pub async fn start(
        config: &ConfigFile,
        router: Arc<dyn TaskRouter>,
        shutdown_requested: CancellationToken,
    ) -> Result<Self, RuntimeError> {
        let cp = &config.control_plane;
        let tokens: Arc<dyn TokenProvider> =
            Arc::new(StaticTokenProvider::new(cp.token.clone(), cp.token_hash.clone()));
        let downloader: Arc<dyn ExecutableDownloader> = Arc::new(DirectoryDownloader::new(
            config.daemon_sets.executable_dir.clone(),
        ));
        Self::start_with(config, router, tokens, downloader, shutdown_requested).await
    }

    /// As [`start`](Self::start), with injected token provider and
    /// downloader collaborators.
    pub async fn start_with(
        config: &ConfigFile,
        router: Arc<dyn TaskRouter>,
        tokens: Arc<dyn TokenProvider>,
        downloader: Arc<dyn ExecutableDownloader>,
        shutdown_requested: CancellationToken,
    ) -> Result<Self, RuntimeError> {
        let cp = &config.control_plane;

        // Child of the process shutdown intent, but cancelled only at
        // the end of the drain so in-flight work can still report.
        let ops_cancel = CancellationToken::new();

        let identity = RunnerIdentity {
            account_id: cp.account_id.clone(),
            runner_id: cp.runner_id.clone(),
            runner_name: cp.runner_name.clone(),
            instance_id: format!("{}-{}", cp.runner_id, std::process::id()),
        };

        let http = ReqwestClient::new(Duration::from_secs(cp.request_timeout_secs))?;
        let client: Arc<dyn ControlPlane> = Arc::new(ControlPlaneClient::new(
            http,
            cp.url.clone(),
            identity,
            tokens,
            ClientOptions {
                backoff_initial: Duration::from_millis(cp.backoff_initial_ms),
                backoff_max_interval: Duration::from_secs(cp.backoff_max_interval_secs),
                backoff_max_elapsed: Duration::from_secs(cp.backoff_max_elapsed_secs),
                status_retry_attempts: cp.status_retry_attempts,
            },
            ops_cancel.clone(),
        ));

        info!(
            runner_id = %cp.runner_id,
            url = %cp.url,
            "Registering runner with control plane"
        );
        client.register().await?;
        info!(runner_id = %cp.runner_id, "Runner registered");

        let metrics = MetricsSystem::start(ops_cancel.clone());

        let child_http =
            ReqwestClient::new(Duration::from_secs(cp.request_timeout_secs))?;
        let manager = Arc::new(DaemonSetManager::new(
            Arc::new(LocalProcessDriver::new(
                child_http,
                config.daemon_sets.base_port,
            )),
            downloader,
            ManagerOptions {
                health_check_interval: Duration::from_secs(
                    config.daemon_sets.health_check_interval_secs,
                ),
                health_check_timeout: Duration::from_secs(
                    config.daemon_sets.health_check_timeout_secs,
                ),
            },
            metrics.client(),
        ));

        let reconciler = DaemonSetReconciler::start(
            Arc::clone(&manager),
            Arc::clone(&client),
            ReconcilerOptions {
                interval: Duration::from_secs(config.daemon_sets.reconcile_interval_secs),
            },
            ops_cancel.clone(),
        );

        let dispatcher = TaskDispatcher::start(
            Arc::clone(&client),
            router,
            metrics.client(),
            DispatcherOptions {
                poll_interval: Duration::from_secs(config.dispatch.poll_interval_secs),
                poll_timeout: Duration::from_secs(config.dispatch.poll_timeout_secs),
                queue_capacity: config.dispatch.queue_capacity,
                worker_count: config.dispatch.worker_count,
            },
            ops_cancel.clone(),
        );

        let heartbeat = spawn_heartbeat(
            Arc::clone(&client),
            Duration::from_secs(cp.heartbeat_interval_secs),
            ops_cancel.clone(),
        );

        Ok(Self {
            dispatcher,
            reconciler,
            manager,
            metrics,
            heartbeat,
            shutdown_requested,
            ops_cancel,
        })
    }

    /// The daemon-set manager, for inspection.
    pub fn manager(&self) -> Arc<DaemonSetManager> {
        Arc::clone(&self.manager)
    }

    /// Current aggregated metrics.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Runs until shutdown is requested, then drains and exits.
    pub async fn run(self) {
        self.shutdown_requested.cancelled().await;
        info!("Shutdown requested");
        self.shutdown().await;
    }

    /// Gracefully stops every subsystem.
    ///
    /// Order matters: the dispatcher drains first so no claimed task is
    /// abandoned, the reconciler stops issuing new convergence work,
    /// daemon sets are torn down under the full key-lock set, and only
    /// then is the operations token cancelled to abort stragglers.
    pub async fn shutdown(self) {
        self.dispatcher.shutdown().await;
        self.reconciler.stop().await;
        self.manager.remove_all().await;

        self.ops_cancel.cancel();
        if let Err(e) = self.heartbeat.await {
            warn!(error = %e, "Heartbeat task join failed");
        }
        self.metrics.shutdown().await;

        info!("Runner stopped");
    }
}

/// Periodic keep-alive pings until the token fires.
fn spawn_heartbeat(
    client: Arc<dyn ControlPlane>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Skip the immediate first tick; registration just happened.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = client.heartbeat().await {
                        warn!(error = %e, "Heartbeat failed");
                    }
                }
            }
        }
    })
}

/// Installs a handler that cancels the returned token on SIGTERM or
/// SIGINT. All subsystems monitor this token and drain gracefully.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(signal) => signal,
                    Err(e) => {
                        warn!(error = %e, "Failed to install SIGTERM handler");
                        let _ = ctrl_c.await;
                        token_clone.cancel();
                        return;
                    }
                };
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT, initiating graceful shutdown"),
                _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("Received interrupt, initiating graceful shutdown");
        }

        token_clone.cancel();
    });

    token
}
