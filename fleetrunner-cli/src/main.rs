//! FleetRunner CLI - command-line interface
//!
//! This binary starts the runner agent and provides basic configuration
//! inspection. Task handlers are registered on the [`HandlerRegistry`]
//! at startup; a build without handlers still manages daemon sets and
//! reports unroutable tasks as failures upstream.

use clap::{Parser, Subcommand};
use fleetrunner::config::ConfigFile;
use fleetrunner::dispatch::HandlerRegistry;
use fleetrunner::logging::init_logging_full;
use fleetrunner::runtime::{install_shutdown_handler, RunnerRuntime};
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod error;

use error::CliError;

#[derive(Parser)]
#[command(name = "fleetrunner", version, about = "Fleet agent for control-plane-driven work execution", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the runner and serve until SIGINT/SIGTERM
    Start {
        /// Path to config.ini (default: ~/.fleetrunner/config.ini)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Enable debug-level logging regardless of RUST_LOG
        #[arg(long)]
        debug: bool,
    },

    /// Print the effective configuration
    Config {
        /// Path to config.ini (default: ~/.fleetrunner/config.ini)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start { config, debug } => start(config.as_deref(), debug).await,
        Command::Config { config } => show_config(config.as_deref()),
    };

    if let Err(e) = result {
        e.exit();
    }
}

fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    match path {
        Some(path) => ConfigFile::load_from(path).map_err(CliError::from),
        None => ConfigFile::load().map_err(CliError::from),
    }
}

async fn start(config_path: Option<&Path>, debug: bool) -> Result<(), CliError> {
    let config = load_config(config_path)?;

    let _logging_guard = init_logging_full(
        &config.logging.directory,
        &config.logging.file,
        config.logging.stdout,
        debug,
    )
    .map_err(CliError::LoggingInit)?;

    tracing::info!(version = fleetrunner::VERSION, "FleetRunner starting");

    let router = Arc::new(HandlerRegistry::new());
    let shutdown = install_shutdown_handler();

    let runtime = RunnerRuntime::start(&config, router, shutdown).await?;
    runtime.run().await;

    Ok(())
}

fn show_config(config_path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let cp = &config.control_plane;

    println!("[control_plane]");
    println!("url = {}", cp.url);
    println!("account_id = {}", cp.account_id);
    println!("runner_id = {}", cp.runner_id);
    println!("runner_name = {}", cp.runner_name);
    println!("token = {}", if cp.token.is_empty() { "(unset)" } else { "(redacted)" });
    println!("request_timeout_secs = {}", cp.request_timeout_secs);
    println!("status_retry_attempts = {}", cp.status_retry_attempts);
    println!("heartbeat_interval_secs = {}", cp.heartbeat_interval_secs);
    println!();
    println!("[dispatch]");
    println!("poll_interval_secs = {}", config.dispatch.poll_interval_secs);
    println!("poll_timeout_secs = {}", config.dispatch.poll_timeout_secs);
    println!("queue_capacity = {}", config.dispatch.queue_capacity);
    println!("worker_count = {}", config.dispatch.worker_count);
    println!();
    println!("[daemon_sets]");
    println!(
        "health_check_interval_secs = {}",
        config.daemon_sets.health_check_interval_secs
    );
    println!(
        "health_check_timeout_secs = {}",
        config.daemon_sets.health_check_timeout_secs
    );
    println!(
        "reconcile_interval_secs = {}",
        config.daemon_sets.reconcile_interval_secs
    );
    println!("base_port = {}", config.daemon_sets.base_port);
    println!(
        "executable_dir = {}",
        config.daemon_sets.executable_dir.display()
    );
    println!();
    println!("[logging]");
    println!("directory = {}", config.logging.directory.display());
    println!("file = {}", config.logging.file);
    println!("stdout = {}", config.logging.stdout);

    Ok(())
}
