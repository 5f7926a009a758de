//! FleetRunner - fleet agent for control-plane-driven work execution
//!
//! This library implements a runner that registers with a remote control
//! plane, polls it for units of work, executes them through a pluggable
//! task router, and keeps long-lived daemon-set worker processes
//! synchronized with the control plane's declared state.
//!
//! # High-Level API
//!
//! For most use cases, the [`runtime`] module provides the composed
//! facade:
//!
//! ```ignore
//! use fleetrunner::config::ConfigFile;
//! use fleetrunner::dispatch::HandlerRegistry;
//! use fleetrunner::runtime::{install_shutdown_handler, RunnerRuntime};
//! use std::sync::Arc;
//!
//! let config = ConfigFile::load()?;
//! let router = Arc::new(HandlerRegistry::new());
//! let shutdown = install_shutdown_handler();
//!
//! let runtime = RunnerRuntime::start(&config, router, shutdown).await?;
//! runtime.run().await;
//! ```

pub mod api;
pub mod config;
pub mod daemonset;
pub mod dispatch;
pub mod keylock;
pub mod logging;
pub mod metrics;
pub mod runtime;

/// Version of the FleetRunner library and CLI.
///
/// This is synchronized across all components in the workspace. The
/// version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
