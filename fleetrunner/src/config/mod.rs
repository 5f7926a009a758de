//! Runner configuration.
//!
//! Configuration lives in `~/.fleetrunner/config.ini`. Settings structs
//! are in [`settings`], documented default constants in [`defaults`],
//! and file loading in [`file`]. Every timing constant in the engine
//! (health-check cadence, reconcile interval, status retry count) is a
//! configurable default here, not a hard-coded invariant.

pub mod defaults;
pub mod file;
pub mod settings;

pub use defaults::{config_dir, config_file_path};
pub use file::ConfigFileError;
pub use settings::{
    ConfigFile, ControlPlaneSettings, DaemonSetSettings, DispatchSettings, LoggingSettings,
};
