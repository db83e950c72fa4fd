//! Binds a service name and directory to the artefact paths shared by every
//! process coordinating on that service.

use std::path::{Path, PathBuf};

use thiserror::Error;

const LOCK_EXTENSION: &str = "lock";
const RECORD_EXTENSION: &str = "pid";
const STOP_EXTENSION: &str = "stopped";
const PAUSE_EXTENSION: &str = "paused";
const TERM_EXTENSION: &str = "term";

/// Immutable identity of a named service.
///
/// Two identities built from the same name and directory refer to the same
/// logical service, whichever process (or process lifetime) built them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceIdentity {
    name: String,
    directory: PathBuf,
}

impl ServiceIdentity {
    /// Builds an identity for `name` rooted at `directory`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when the name is empty or would escape the
    /// directory.
    pub fn new(
        name: impl Into<String>,
        directory: impl Into<PathBuf>,
    ) -> Result<Self, IdentityError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            directory: directory.into(),
        })
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Directory housing the service artefacts.
    #[must_use]
    pub fn directory(&self) -> &Path {
        self.directory.as_path()
    }

    /// Path created exclusively by the lock holder.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.artefact(LOCK_EXTENSION)
    }

    /// Path of the PID record.
    #[must_use]
    pub fn record_path(&self) -> PathBuf {
        self.artefact(RECORD_EXTENSION)
    }

    /// Path of the stop flag.
    #[must_use]
    pub fn stop_path(&self) -> PathBuf {
        self.artefact(STOP_EXTENSION)
    }

    /// Path of the pause flag.
    #[must_use]
    pub fn pause_path(&self) -> PathBuf {
        self.artefact(PAUSE_EXTENSION)
    }

    /// Path of the termination flag used by touch-file signalling.
    #[must_use]
    pub fn term_path(&self) -> PathBuf {
        self.artefact(TERM_EXTENSION)
    }

    fn artefact(&self, extension: &str) -> PathBuf {
        self.directory.join(format!("{}.{extension}", self.name))
    }
}

fn validate_name(name: &str) -> Result<(), IdentityError> {
    if name.is_empty() {
        return Err(IdentityError::EmptyName);
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(IdentityError::InvalidName {
            name: name.to_owned(),
        });
    }
    Ok(())
}

/// Errors raised while building a [`ServiceIdentity`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// The service name was empty.
    #[error("service name must not be empty")]
    EmptyName,
    /// The service name contained a path separator or traversal component.
    #[error("service name '{name}' must be a plain file name")]
    InvalidName {
        /// Rejected name.
        name: String,
    },
}
