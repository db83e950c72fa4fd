//! Resolves and prepares the directory shared by every process coordinating
//! on a service.
//!
//! The core library treats a missing directory as an unexpected error, so the
//! binaries create it up front with owner-only permissions before handing the
//! path to a service handle.

use std::fs::DirBuilder;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::Config;

/// Directory housing lock, record and flag files for configured services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeDirectory {
    path: PathBuf,
}

impl RuntimeDirectory {
    /// Resolves the runtime directory from the shared configuration without
    /// touching the filesystem.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            path: config.directory(),
        }
    }

    /// Ensures the directory exists, creating missing components with
    /// owner-only permissions.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeDirectoryError::Create`] when the directory cannot be
    /// created for any reason other than it already existing.
    pub fn prepare(&self) -> Result<&Path, RuntimeDirectoryError> {
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        if let Err(source) = builder.create(&self.path)
            && source.kind() != io::ErrorKind::AlreadyExists
        {
            return Err(RuntimeDirectoryError::Create {
                path: self.path.clone(),
                source,
            });
        }
        Ok(self.path.as_path())
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }
}

/// Errors raised while preparing the runtime directory.
#[derive(Debug, Error)]
pub enum RuntimeDirectoryError {
    /// Creating the directory failed.
    #[error("failed to prepare runtime directory '{path}': {source}")]
    Create {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn prepares_nested_directory() {
        let temp = TempDir::new().expect("temp dir");
        let config = Config {
            directory: Some(temp.path().join("a").join("b")),
            ..Config::default()
        };
        let runtime = RuntimeDirectory::from_config(&config);
        let path = runtime.prepare().expect("directory should be created");
        assert!(path.is_dir());
        // A second call finds the directory in place and still succeeds.
        runtime.prepare().expect("prepare is idempotent");
    }

    #[cfg(unix)]
    #[test]
    fn prepared_directory_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().expect("temp dir");
        let config = Config {
            directory: Some(temp.path().join("private")),
            ..Config::default()
        };
        let runtime = RuntimeDirectory::from_config(&config);
        let path = runtime.prepare().expect("directory should be created");
        let mode = std::fs::metadata(path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn reports_creation_failure() {
        let temp = TempDir::new().expect("temp dir");
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, b"").expect("write blocker");
        let config = Config {
            directory: Some(blocker.join("nested")),
            ..Config::default()
        };
        let error = RuntimeDirectory::from_config(&config)
            .prepare()
            .expect_err("a file in the way must fail");
        assert!(matches!(error, RuntimeDirectoryError::Create { .. }));
    }
}
