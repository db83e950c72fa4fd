//! Single-owner run lock with a companion PID record.
//!
//! Ownership is claimed with an atomic create-exclusive of the lock path.
//! The holder keeps an advisory lock on that file for the lifetime of its
//! token, so a lock file is only reclaimed once no process holds it. The
//! holder's PID is written both into the lock file and into the record read
//! by observers.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::LOCK_TARGET;
use crate::identity::ServiceIdentity;

mod exclusive;
pub(crate) mod probe;
mod record;

use exclusive::{Candidate, Held, Inspection};

/// Age after which a lock file that never received a PID is considered
/// abandoned by a holder that crashed mid-acquisition.
pub const STARTUP_GRACE: Duration = Duration::from_secs(2);

/// Run lock for one service identity.
#[derive(Debug, Clone)]
pub struct RunLock {
    lock_path: PathBuf,
    record_path: PathBuf,
}

impl RunLock {
    /// Builds the run lock guarding `identity`.
    #[must_use]
    pub fn new(identity: &ServiceIdentity) -> Self {
        Self {
            lock_path: identity.lock_path(),
            record_path: identity.record_path(),
        }
    }

    /// Path claimed by the holder.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        self.lock_path.as_path()
    }

    /// Path of the PID record.
    #[must_use]
    pub fn record_path(&self) -> &Path {
        self.record_path.as_path()
    }

    /// Attempts to claim the lock for the current process.
    ///
    /// Returns `Ok(None)` when another live process holds the lock. A lock
    /// left behind by a dead holder is removed and the claim retried once.
    /// Concurrent reclaimers never remove each other's fresh claims.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] for filesystem failures other than the lock
    /// already existing, and when probing the recorded holder fails.
    pub fn acquire(&self) -> Result<Option<LockToken>, LockError> {
        if let Some(token) = self.try_claim()? {
            return Ok(Some(token));
        }
        if self.reclaim_stale()? {
            return self.try_claim();
        }
        debug!(
            target: LOCK_TARGET,
            file = %self.lock_path.display(),
            "run lock is held by another process"
        );
        Ok(None)
    }

    /// PID of the live holder, if any.
    ///
    /// Missing, empty and malformed records, and records naming a process
    /// that no longer exists, all report `None`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] when the record cannot be read or the probe
    /// fails for reasons other than the process being absent.
    pub fn running_pid(&self) -> Result<Option<u32>, LockError> {
        let recorded =
            record::read_pid(&self.record_path).map_err(|source| LockError::RecordRead {
                path: self.record_path.clone(),
                source,
            })?;
        let Some(pid) = recorded else {
            return Ok(None);
        };
        if check_process(pid)? {
            Ok(Some(pid))
        } else {
            debug!(target: LOCK_TARGET, pid, "recorded holder is no longer running");
            Ok(None)
        }
    }

    /// Reports whether the lock path currently exists, live holder or not.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Inspect`] when the existence check fails.
    pub fn is_claimed(&self) -> Result<bool, LockError> {
        self.lock_path
            .try_exists()
            .map_err(|source| LockError::Inspect {
                path: self.lock_path.clone(),
                source,
            })
    }

    fn try_claim(&self) -> Result<Option<LockToken>, LockError> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        let file = match options.open(&self.lock_path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
            Err(source) => {
                return Err(LockError::Create {
                    path: self.lock_path.clone(),
                    source,
                });
            }
        };

        // The advisory lock is taken before the stamp, so a stamped file
        // nobody holds was left by a holder that is gone.
        let file = exclusive::hold(file).map_err(|source| {
            discard_unheld(&self.lock_path);
            LockError::Stamp {
                path: self.lock_path.clone(),
                source,
            }
        })?;

        // The token owns the claim from here on so every early return below
        // releases it again.
        let pid = std::process::id();
        let mut token = LockToken {
            lock_path: self.lock_path.clone(),
            record_path: self.record_path.clone(),
            pid,
            file,
        };
        token.stamp_lock()?;
        record::write_pid(&self.record_path, pid).map_err(|source| LockError::RecordWrite {
            path: self.record_path.clone(),
            source,
        })?;
        info!(
            target: LOCK_TARGET,
            pid,
            file = %self.lock_path.display(),
            "acquired run lock"
        );
        Ok(Some(token))
    }

    fn reclaim_stale(&self) -> Result<bool, LockError> {
        let candidate = match exclusive::inspect(&self.lock_path) {
            Ok(Inspection::Abandoned(candidate)) => candidate,
            Ok(Inspection::Held) => return Ok(false),
            // The holder released between our claim attempt and this check.
            Ok(Inspection::Missing) => return Ok(true),
            Err(source) => {
                return Err(LockError::Inspect {
                    path: self.lock_path.clone(),
                    source,
                });
            }
        };

        match self.read_stamp(&candidate)? {
            Some(pid) => {
                if check_process(pid)? {
                    return Ok(false);
                }
                warn!(
                    target: LOCK_TARGET,
                    pid,
                    file = %self.lock_path.display(),
                    "lock holder not detected; removing stale lock"
                );
            }
            None => {
                if !self.unstamped_lock_expired(&candidate)? {
                    return Ok(false);
                }
                warn!(
                    target: LOCK_TARGET,
                    file = %self.lock_path.display(),
                    grace_ms = STARTUP_GRACE.as_millis(),
                    "lock never received a pid; removing abandoned lock"
                );
            }
        }

        // Another reclaimer may already have replaced the file; its claim is
        // left alone and the retry reports contention.
        let linked = candidate
            .still_linked(&self.lock_path)
            .map_err(|source| LockError::Inspect {
                path: self.lock_path.clone(),
                source,
            })?;
        if !linked {
            debug!(
                target: LOCK_TARGET,
                file = %self.lock_path.display(),
                "stale lock already replaced"
            );
            return Ok(true);
        }
        let removed = match fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(source) => Err(LockError::StaleCleanup {
                path: self.lock_path.clone(),
                source,
            }),
        };
        drop(candidate);
        removed
    }

    fn read_stamp(&self, candidate: &Candidate) -> Result<Option<u32>, LockError> {
        let mut content = String::new();
        let mut file = candidate.file();
        file.read_to_string(&mut content)
            .map_err(|source| LockError::Inspect {
                path: self.lock_path.clone(),
                source,
            })?;
        Ok(content.trim().parse::<u32>().ok())
    }

    fn unstamped_lock_expired(&self, candidate: &Candidate) -> Result<bool, LockError> {
        let modified = candidate
            .file()
            .metadata()
            .and_then(|metadata| metadata.modified())
            .map_err(|source| LockError::Inspect {
                path: self.lock_path.clone(),
                source,
            })?;
        // A modification time in the future reads as a fresh lock.
        Ok(modified
            .elapsed()
            .is_ok_and(|age| age >= STARTUP_GRACE))
    }
}

fn discard_unheld(path: &Path) {
    if let Err(error) = fs::remove_file(path) {
        warn!(
            target: LOCK_TARGET,
            file = %path.display(),
            %error,
            "failed to remove unheld lock file"
        );
    }
}

/// Exclusive claim on a [`RunLock`].
///
/// Dropping the token truncates the PID record and removes the lock path
/// before the advisory lock on the file is let go. Failures during release
/// are logged and never escalate, so teardown always completes.
#[derive(Debug)]
pub struct LockToken {
    lock_path: PathBuf,
    record_path: PathBuf,
    pid: u32,
    file: Held,
}

impl LockToken {
    /// PID recorded for this claim.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Releases the claim. Equivalent to dropping the token.
    pub fn release(self) {
        drop(self);
    }

    fn stamp_lock(&mut self) -> Result<(), LockError> {
        writeln!(self.file, "{}", self.pid)
            .and_then(|()| self.file.sync_all())
            .map_err(|source| LockError::Stamp {
                path: self.lock_path.clone(),
                source,
            })
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        // Clear the record before giving up the claim so a successor's record
        // is never truncated by us.
        if let Err(error) = record::truncate(&self.record_path) {
            warn!(
                target: LOCK_TARGET,
                file = %self.record_path.display(),
                %error,
                "failed to clear pid record"
            );
        }
        match fs::remove_file(&self.lock_path) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => {
                warn!(
                    target: LOCK_TARGET,
                    file = %self.lock_path.display(),
                    %error,
                    "failed to remove lock file"
                );
            }
            _ => {
                info!(
                    target: LOCK_TARGET,
                    pid = self.pid,
                    file = %self.lock_path.display(),
                    "released run lock"
                );
            }
        }
    }
}

fn check_process(pid: u32) -> Result<bool, LockError> {
    probe::is_alive(pid).map_err(|source| LockError::CheckProcess { pid, source })
}

/// Errors raised by [`RunLock`] operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Creating the lock file failed for a reason other than contention.
    #[error("failed to create lock file '{path}': {source}")]
    Create {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the holder PID into the lock file failed.
    #[error("failed to stamp lock file '{path}': {source}")]
    Stamp {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Inspecting an existing lock file failed.
    #[error("failed to inspect lock file '{path}': {source}")]
    Inspect {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Removing a stale lock failed.
    #[error("failed to remove stale lock '{path}': {source}")]
    StaleCleanup {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the PID record failed.
    #[error("failed to write pid record '{path}': {source}")]
    RecordWrite {
        /// Record path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Reading the PID record failed.
    #[error("failed to read pid record '{path}': {source}")]
    RecordRead {
        /// Record path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Probing a recorded process failed.
    #[error("failed to check process {pid}: {source}")]
    CheckProcess {
        /// PID that failed to probe.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}
