//! Unified error surface of the service façade.

use std::io;

use thiserror::Error;

use crate::flag::FlagError;
use crate::identity::IdentityError;
use crate::lock::LockError;
use crate::session::SessionError;

/// Errors surfaced by [`crate::ServiceHandle`] operations.
///
/// Lock contention is not an error: it is reported through return values.
/// Everything here is either an unexpected filesystem failure or a
/// programming error such as starting a second trap session.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service identity was rejected.
    #[error(transparent)]
    Identity(#[from] IdentityError),
    /// Reading or writing a flag failed.
    #[error(transparent)]
    Flag(#[from] FlagError),
    /// A run lock operation failed.
    #[error(transparent)]
    Lock(#[from] LockError),
    /// Installing the trap session failed.
    #[error("failed to start trap session: {source}")]
    Session {
        /// Underlying session error.
        #[from]
        source: SessionError,
    },
    /// Delivering a stop signal to the holder failed.
    #[error("failed to signal process {pid}: {source}")]
    Signal {
        /// Target PID.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}
