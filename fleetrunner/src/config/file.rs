//! Configuration file loading for ~/.fleetrunner/config.ini.
//!
//! Missing files and missing keys fall back to defaults; present but
//! malformed values are errors, so a typo fails loudly instead of
//! silently running with a default.

use super::defaults::config_file_path;
use super::settings::ConfigFile;
use ini::{Ini, Properties};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read or parse the config file
    #[error("failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigFile {
    /// Loads configuration from the default path.
    ///
    /// A missing file yields the built-in defaults.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Loads configuration from `path`, defaulting on absence.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("control_plane")) {
            let cp = &mut config.control_plane;
            cp.url = get_string(section, "url", &cp.url);
            cp.account_id = get_string(section, "account_id", &cp.account_id);
            cp.runner_id = get_string(section, "runner_id", &cp.runner_id);
            cp.runner_name = get_string(section, "runner_name", &cp.runner_name);
            cp.token = get_string(section, "token", &cp.token);
            cp.token_hash = get_string(section, "token_hash", &cp.token_hash);
            cp.request_timeout_secs = get_u64(
                section,
                "control_plane",
                "request_timeout_secs",
                cp.request_timeout_secs,
            )?;
            cp.backoff_initial_ms = get_u64(
                section,
                "control_plane",
                "backoff_initial_ms",
                cp.backoff_initial_ms,
            )?;
            cp.backoff_max_interval_secs = get_u64(
                section,
                "control_plane",
                "backoff_max_interval_secs",
                cp.backoff_max_interval_secs,
            )?;
            cp.backoff_max_elapsed_secs = get_u64(
                section,
                "control_plane",
                "backoff_max_elapsed_secs",
                cp.backoff_max_elapsed_secs,
            )?;
            cp.status_retry_attempts = get_u64(
                section,
                "control_plane",
                "status_retry_attempts",
                cp.status_retry_attempts as u64,
            )? as usize;
            cp.heartbeat_interval_secs = get_u64(
                section,
                "control_plane",
                "heartbeat_interval_secs",
                cp.heartbeat_interval_secs,
            )?;
        }

        if let Some(section) = ini.section(Some("dispatch")) {
            let d = &mut config.dispatch;
            d.poll_interval_secs =
                get_u64(section, "dispatch", "poll_interval_secs", d.poll_interval_secs)?;
            d.poll_timeout_secs =
                get_u64(section, "dispatch", "poll_timeout_secs", d.poll_timeout_secs)?;
            d.queue_capacity =
                get_u64(section, "dispatch", "queue_capacity", d.queue_capacity as u64)? as usize;
            d.worker_count =
                get_u64(section, "dispatch", "worker_count", d.worker_count as u64)? as usize;
        }

        if let Some(section) = ini.section(Some("daemon_sets")) {
            let ds = &mut config.daemon_sets;
            ds.health_check_interval_secs = get_u64(
                section,
                "daemon_sets",
                "health_check_interval_secs",
                ds.health_check_interval_secs,
            )?;
            ds.health_check_timeout_secs = get_u64(
                section,
                "daemon_sets",
                "health_check_timeout_secs",
                ds.health_check_timeout_secs,
            )?;
            ds.reconcile_interval_secs = get_u64(
                section,
                "daemon_sets",
                "reconcile_interval_secs",
                ds.reconcile_interval_secs,
            )?;
            ds.base_port =
                get_u64(section, "daemon_sets", "base_port", ds.base_port as u64)? as u16;
            if let Some(dir) = section.get("executable_dir") {
                ds.executable_dir = PathBuf::from(dir);
            }
        }

        if let Some(section) = ini.section(Some("logging")) {
            let log = &mut config.logging;
            if let Some(dir) = section.get("directory") {
                log.directory = PathBuf::from(dir);
            }
            log.file = get_string(section, "file", &log.file);
            log.stdout = get_bool(section, "logging", "stdout", log.stdout)?;
        }

        Ok(config)
    }
}

fn get_string(section: &Properties, key: &str, default: &str) -> String {
    section
        .get(key)
        .map(|v| v.to_string())
        .unwrap_or_else(|| default.to_string())
}

fn get_u64(
    section: &Properties,
    section_name: &str,
    key: &str,
    default: u64,
) -> Result<u64, ConfigFileError> {
    match section.get(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigFileError::InvalidValue {
            section: section_name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected a non-negative integer".to_string(),
        }),
    }
}

fn get_bool(
    section: &Properties,
    section_name: &str,
    key: &str,
    default: bool,
) -> Result<bool, ConfigFileError> {
    match section.get(key) {
        None => Ok(default),
        Some(value) => match value {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(ConfigFileError::InvalidValue {
                section: section_name.to_string(),
                key: key.to_string(),
                value: value.to_string(),
                reason: "expected true or false".to_string(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = ConfigFile::load_from(Path::new("/nonexistent/config.ini")).unwrap();
        assert_eq!(config.dispatch.worker_count, 8);
        assert_eq!(config.daemon_sets.health_check_interval_secs, 5);
        assert_eq!(config.daemon_sets.health_check_timeout_secs, 180);
        assert_eq!(config.control_plane.status_retry_attempts, 5);
    }

    #[test]
    fn parses_all_sections() {
        let file = write_config(
            r#"
[control_plane]
url = https://plane.example.com
account_id = acct-1
runner_id = runner-9
runner_name = edge-9
token = tok
token_hash = hash
status_retry_attempts = 7

[dispatch]
poll_interval_secs = 10
worker_count = 4

[daemon_sets]
reconcile_interval_secs = 120
base_port = 15000
executable_dir = /opt/daemons

[logging]
directory = /var/log/fleetrunner
file = runner.log
stdout = false
"#,
        );

        let config = ConfigFile::load_from(file.path()).unwrap();
        assert_eq!(config.control_plane.url, "https://plane.example.com");
        assert_eq!(config.control_plane.runner_id, "runner-9");
        assert_eq!(config.control_plane.status_retry_attempts, 7);
        assert_eq!(config.dispatch.poll_interval_secs, 10);
        assert_eq!(config.dispatch.worker_count, 4);
        // Unspecified keys keep defaults.
        assert_eq!(config.dispatch.queue_capacity, 64);
        assert_eq!(config.daemon_sets.reconcile_interval_secs, 120);
        assert_eq!(config.daemon_sets.base_port, 15000);
        assert_eq!(
            config.daemon_sets.executable_dir,
            PathBuf::from("/opt/daemons")
        );
        assert_eq!(config.logging.file, "runner.log");
        assert!(!config.logging.stdout);
    }

    #[test]
    fn malformed_integer_is_rejected() {
        let file = write_config("[dispatch]\nworker_count = many\n");
        let err = ConfigFile::load_from(file.path()).unwrap_err();
        match err {
            ConfigFileError::InvalidValue { section, key, .. } => {
                assert_eq!(section, "dispatch");
                assert_eq!(key, "worker_count");
            }
            other => panic!("expected invalid value, got {:?}", other),
        }
    }

    #[test]
    fn malformed_bool_is_rejected() {
        let file = write_config("[logging]\nstdout = maybe\n");
        assert!(ConfigFile::load_from(file.path()).is_err());
    }
}
