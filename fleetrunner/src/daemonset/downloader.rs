//! Executable resolution for daemon sets.
//!
//! Resolving a `{type, version, executable}` descriptor to a runnable
//! binary is delegated to an [`ExecutableDownloader`]; artifact fetching
//! and caching live outside this crate. [`DirectoryDownloader`] is the
//! built-in implementation for pre-provisioned install trees.

use crate::api::types::OperationalConfig;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use thiserror::Error;

/// Failure to resolve a daemon-set executable.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DownloadError {
    pub message: String,
}

impl DownloadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Boxed future returned by [`ExecutableDownloader`].
pub type DownloadFuture<'a> = Pin<Box<dyn Future<Output = Result<PathBuf, DownloadError>> + Send + 'a>>;

/// Resolves a daemon set's executable descriptor to a local binary path.
pub trait ExecutableDownloader: Send + Sync {
    /// Returns a runnable binary for the given type and config.
    fn resolve<'a>(&'a self, set_type: &'a str, config: &'a OperationalConfig)
        -> DownloadFuture<'a>;
}

/// Downloader over a local install tree laid out as
/// `<root>/<type>/<version>/<executable>`.
pub struct DirectoryDownloader {
    root: PathBuf,
}

impl DirectoryDownloader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn binary_path(&self, set_type: &str, config: &OperationalConfig) -> PathBuf {
        self.root
            .join(set_type)
            .join(&config.version)
            .join(&config.executable)
    }
}

impl ExecutableDownloader for DirectoryDownloader {
    fn resolve<'a>(
        &'a self,
        set_type: &'a str,
        config: &'a OperationalConfig,
    ) -> DownloadFuture<'a> {
        Box::pin(async move {
            let path = self.binary_path(set_type, config);
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => Ok(path),
                Ok(_) => Err(DownloadError::new(format!(
                    "executable path {} is not a regular file",
                    path.display()
                ))),
                Err(e) => Err(DownloadError::new(format!(
                    "executable {} not found: {}",
                    path.display(),
                    e
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config(version: &str, executable: &str) -> OperationalConfig {
        OperationalConfig {
            version: version.into(),
            executable: executable.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn resolves_existing_binary() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("secrets").join("1.2.0");
        std::fs::create_dir_all(&dir).unwrap();
        let mut file = std::fs::File::create(dir.join("ds-runner")).unwrap();
        file.write_all(b"#!/bin/sh\n").unwrap();

        let downloader = DirectoryDownloader::new(root.path());
        let path = downloader
            .resolve("secrets", &config("1.2.0", "ds-runner"))
            .await
            .unwrap();
        assert!(path.ends_with("secrets/1.2.0/ds-runner"));
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let downloader = DirectoryDownloader::new(root.path());
        let err = downloader
            .resolve("secrets", &config("9.9.9", "ds-runner"))
            .await
            .unwrap_err();
        assert!(err.message.contains("not found"));
    }
}
