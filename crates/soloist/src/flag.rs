//! Boolean state shared between unrelated processes through the existence of
//! a file.
//!
//! Flags are a best-effort, eventually-consistent signal rather than a mutex:
//! any process with access to the directory may set or clear them, and no
//! locking guards the file itself.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{debug, warn};

use crate::FLAG_TARGET;

/// A persisted boolean.
///
/// `set` and `unset` are idempotent: repeating either leaves the same state
/// as calling it once.
#[cfg_attr(test, mockall::automock)]
pub trait Flag: Send + Sync {
    /// Raises the flag.
    ///
    /// # Errors
    ///
    /// Returns [`FlagError::Set`] when the backing store cannot be written.
    fn set(&self) -> Result<(), FlagError>;

    /// Lowers the flag.
    ///
    /// # Errors
    ///
    /// Returns [`FlagError::Unset`] when the backing store cannot be cleared.
    fn unset(&self) -> Result<(), FlagError>;

    /// Reports whether the flag is raised.
    ///
    /// # Errors
    ///
    /// Returns [`FlagError::Query`] when the backing store cannot be read.
    fn is_set(&self) -> Result<bool, FlagError>;
}

/// Flag persisted as the existence of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFlag {
    path: PathBuf,
}

impl FileFlag {
    /// Builds a flag backed by `path`. Nothing is created until [`Flag::set`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Clears the flag, logging instead of failing when the file cannot be
    /// removed. Used on teardown paths that must always complete.
    pub fn unset_quietly(&self) {
        if let Err(error) = self.unset() {
            warn!(
                target: FLAG_TARGET,
                file = %self.path.display(),
                %error,
                "failed to clear flag"
            );
        }
    }
}

impl Flag for FileFlag {
    fn set(&self) -> Result<(), FlagError> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|source| FlagError::Set {
                path: self.path.clone(),
                source,
            })?;
        debug!(target: FLAG_TARGET, file = %self.path.display(), "flag set");
        Ok(())
    }

    fn unset(&self) -> Result<(), FlagError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(target: FLAG_TARGET, file = %self.path.display(), "flag cleared");
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(FlagError::Unset {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn is_set(&self) -> Result<bool, FlagError> {
        self.path.try_exists().map_err(|source| FlagError::Query {
            path: self.path.clone(),
            source,
        })
    }
}

/// In-process flag for exercising state machines without a filesystem.
///
/// Clones share the same underlying bit.
#[derive(Debug, Clone, Default)]
pub struct MemoryFlag {
    raised: Arc<AtomicBool>,
}

impl MemoryFlag {
    /// Builds a lowered flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Flag for MemoryFlag {
    fn set(&self) -> Result<(), FlagError> {
        self.raised.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn unset(&self) -> Result<(), FlagError> {
        self.raised.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_set(&self) -> Result<bool, FlagError> {
        Ok(self.raised.load(Ordering::SeqCst))
    }
}

/// Errors raised while manipulating a [`Flag`].
#[derive(Debug, Error)]
pub enum FlagError {
    /// Creating the backing file failed.
    #[error("failed to set flag '{path}': {source}")]
    Set {
        /// Flag file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Removing the backing file failed.
    #[error("failed to clear flag '{path}': {source}")]
    Unset {
        /// Flag file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Checking for the backing file failed.
    #[error("failed to query flag '{path}': {source}")]
    Query {
        /// Flag file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
