//! Façade binding a service name and directory to its flags, lock and trap.

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::HANDLE_TARGET;
use crate::error::ServiceError;
use crate::flag::{FileFlag, Flag};
use crate::identity::ServiceIdentity;
use crate::lock::{RunLock, probe};
use crate::machine::{Collaborators, LifecycleMachine, Outcome};
use crate::session::TrapMode;

/// Sleep between pause polls unless configured otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Result of [`ServiceHandle::request_remote_stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStop {
    /// No live process holds the lock.
    NotRunning,
    /// The holder is this process; its stop flag was raised.
    Local,
    /// The holder exited before the timeout.
    Stopped {
        /// PID of the former holder.
        pid: u32,
    },
    /// The holder was still alive when the timeout elapsed.
    StillRunning {
        /// PID of the holder.
        pid: u32,
    },
}

impl RemoteStop {
    /// Whether the service is known not to be running any more.
    #[must_use]
    pub const fn is_stopped(self) -> bool {
        !matches!(self, Self::StillRunning { .. })
    }
}

/// Handle to one named service slot.
///
/// The handle is shareable across threads so that a supervisor thread can
/// call [`ServiceHandle::stop`] or [`ServiceHandle::pause`] while another
/// thread is inside [`ServiceHandle::service`].
#[derive(Debug)]
pub struct ServiceHandle {
    identity: ServiceIdentity,
    stop: FileFlag,
    pause: FileFlag,
    term: FileFlag,
    lock: RunLock,
    trap: TrapMode,
    poll_interval: Duration,
    holding: AtomicBool,
}

impl ServiceHandle {
    /// Builds a handle for `name` inside `directory` using the platform's
    /// default trap.
    ///
    /// The directory must already exist before the service runs.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Identity`] when `name` cannot be used as a file
    /// stem.
    pub fn new(
        name: impl Into<String>,
        directory: impl Into<PathBuf>,
    ) -> Result<Self, ServiceError> {
        let identity = ServiceIdentity::new(name, directory)?;
        let term = FileFlag::new(identity.term_path());
        Ok(Self {
            stop: FileFlag::new(identity.stop_path()),
            pause: FileFlag::new(identity.pause_path()),
            lock: RunLock::new(&identity),
            trap: TrapMode::platform_default(term.clone()),
            term,
            identity,
            poll_interval: DEFAULT_POLL_INTERVAL,
            holding: AtomicBool::new(false),
        })
    }

    /// Replaces the trap installed while the service runs.
    #[must_use]
    pub fn with_trap_mode(mut self, trap: TrapMode) -> Self {
        self.trap = trap;
        self
    }

    /// Switches to the touch-file trap, polling this service's termination
    /// flag every `interval`.
    #[must_use]
    pub fn with_touch_file(self, interval: Duration) -> Self {
        let flag = self.term.clone();
        self.with_trap_mode(TrapMode::TouchFile { flag, interval })
    }

    /// Sets the sleep between pause polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Name and directory this handle is bound to.
    #[must_use]
    pub const fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    /// Trap installed while the service runs.
    #[must_use]
    pub const fn trap_mode(&self) -> &TrapMode {
        &self.trap
    }

    /// Runs `callback` repeatedly under the run lock until it returns
    /// `false` or a stop is requested.
    ///
    /// Returns `Ok(false)` without invoking the callback or touching any
    /// state when the stop flag is raised or another live process holds the
    /// lock. Otherwise returns whether the callback ran at least once.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] on unexpected filesystem failures and when a
    /// trap session is already active in this process.
    pub fn service<F>(&self, callback: F) -> Result<bool, ServiceError>
    where
        F: FnMut() -> bool,
    {
        if self.stop.is_set()? {
            info!(
                target: HANDLE_TARGET,
                service = self.identity.name(),
                "stop flag raised; not starting"
            );
            return Ok(false);
        }
        if let Some(pid) = self.lock.running_pid()? {
            info!(
                target: HANDLE_TARGET,
                service = self.identity.name(),
                pid,
                "service already running"
            );
            return Ok(false);
        }
        // A termination request aimed at an earlier holder must not stop this
        // run. It is cleared before the claim publishes our PID.
        if self.term.is_set()? {
            debug!(
                target: HANDLE_TARGET,
                service = self.identity.name(),
                "discarding leftover termination flag"
            );
            self.term.unset()?;
        }

        let machine = LifecycleMachine::new(Collaborators {
            stop: &self.stop,
            pause: &self.pause,
            lock: &self.lock,
            trap: &self.trap,
            poll_interval: self.poll_interval,
            holding: &self.holding,
        });
        let report = machine.run(callback)?;
        if report.outcome == Outcome::Contention {
            debug!(
                target: HANDLE_TARGET,
                service = self.identity.name(),
                "lost the race for the run lock"
            );
        }
        Ok(report.reached_run)
    }

    /// Clears the stop flag so that the service may run again.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Flag`] when the flag cannot be removed.
    pub fn start(&self) -> Result<(), ServiceError> {
        self.stop.unset()?;
        Ok(())
    }

    /// Raises the stop flag. A running service halts at its next status
    /// check and later calls to [`ServiceHandle::service`] refuse to start.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Flag`] when the flag cannot be created.
    pub fn stop(&self) -> Result<(), ServiceError> {
        self.stop.set()?;
        Ok(())
    }

    /// Reports whether the stop flag is raised.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Flag`] when the flag cannot be queried.
    pub fn is_stopped(&self) -> Result<bool, ServiceError> {
        Ok(self.stop.is_set()?)
    }

    /// Raises the pause flag.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Flag`] when the flag cannot be created.
    pub fn pause(&self) -> Result<(), ServiceError> {
        self.pause.set()?;
        Ok(())
    }

    /// Clears the pause flag.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Flag`] when the flag cannot be removed.
    pub fn resume(&self) -> Result<(), ServiceError> {
        self.pause.unset()?;
        Ok(())
    }

    /// Reports whether the pause flag is raised.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Flag`] when the flag cannot be queried.
    pub fn is_paused(&self) -> Result<bool, ServiceError> {
        Ok(self.pause.is_set()?)
    }

    /// Reports whether this handle holds the run lock and no stop has been
    /// asked for through the stop or termination flags.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Flag`] when a flag cannot be queried.
    pub fn is_running(&self) -> Result<bool, ServiceError> {
        if !self.holding.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(!self.stop.is_set()? && !self.term.is_set()?)
    }

    /// PID of the live lock holder, whether this process or another.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Lock`] when the PID record cannot be read or
    /// the holder cannot be probed.
    pub fn running_pid(&self) -> Result<Option<u32>, ServiceError> {
        Ok(self.lock.running_pid()?)
    }

    /// Asks the current holder to stop and waits up to `timeout` for it to
    /// exit, probing every `poll_interval`.
    ///
    /// When the holder is this process only the stop flag is raised and the
    /// call returns at once. Other holders receive `SIGTERM`, or the
    /// termination flag when this handle uses the touch-file trap. Every Unix
    /// holder traps `SIGTERM`, so either route ends in a full teardown.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when the holder cannot be resolved, signalled
    /// or probed.
    pub fn request_remote_stop(
        &self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<RemoteStop, ServiceError> {
        let Some(pid) = self.lock.running_pid()? else {
            return Ok(RemoteStop::NotRunning);
        };
        if pid == process::id() {
            self.stop()?;
            info!(target: HANDLE_TARGET, pid, "stop flag raised for local service");
            return Ok(RemoteStop::Local);
        }

        self.notify(pid)?;
        let deadline = Instant::now() + timeout;
        loop {
            if !is_alive(pid)? {
                info!(target: HANDLE_TARGET, pid, "service exited");
                return Ok(RemoteStop::Stopped { pid });
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    target: HANDLE_TARGET,
                    pid,
                    timeout_ms = timeout.as_millis(),
                    "service still running after stop request"
                );
                return Ok(RemoteStop::StillRunning { pid });
            }
            thread::sleep(poll_interval.min(deadline - now));
        }
    }

    fn notify(&self, pid: u32) -> Result<(), ServiceError> {
        #[cfg(unix)]
        {
            if !self.trap.uses_touch_file() {
                debug!(target: HANDLE_TARGET, pid, "sending SIGTERM");
                return match probe::request_termination(pid) {
                    Ok(()) => Ok(()),
                    // The holder may exit between the record read and the signal.
                    Err(_) if !is_alive(pid)? => Ok(()),
                    Err(source) => Err(ServiceError::Signal { pid, source }),
                };
            }
        }
        debug!(
            target: HANDLE_TARGET,
            pid,
            file = %self.term.path().display(),
            "raising termination flag"
        );
        self.term.set()?;
        Ok(())
    }
}

fn is_alive(pid: u32) -> Result<bool, ServiceError> {
    probe::is_alive(pid).map_err(|source| ServiceError::Signal { pid, source })
}
