//! CLI error handling with user-friendly messages.

use fleetrunner::config::ConfigFileError;
use fleetrunner::runtime::RuntimeError;
use std::fmt;
use std::process;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(std::io::Error),
    /// Configuration error
    Config(ConfigFileError),
    /// Runtime startup failure
    Startup(RuntimeError),
}

impl CliError {
    /// Exits the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Startup(_) = self {
            eprintln!();
            eprintln!("Check that:");
            eprintln!("  1. [control_plane] url, account_id and runner_id are set");
            eprintln!("  2. The runner token is valid");
            eprintln!("  3. The control plane is reachable from this host");
        }

        process::exit(1);
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(e) => write!(f, "failed to initialize logging: {}", e),
            CliError::Config(e) => write!(f, "{}", e),
            CliError::Startup(e) => write!(f, "failed to start runner: {}", e),
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<RuntimeError> for CliError {
    fn from(e: RuntimeError) -> Self {
        CliError::Startup(e)
    }
}
