//! Process-wide trap for external stop requests.
//!
//! A [`SignalSession`] is the scoped capability that owns the process signal
//! table while a service runs. Starting it captures the existing handlers and
//! chains to them; dropping it restores exactly what was captured. Only one
//! session may exist per process at a time.
//!
//! On Unix every session traps the graceful shutdown signals, including the
//! touch-file variant, so a `SIGTERM` never bypasses teardown.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::SESSION_TARGET;
use crate::flag::FileFlag;

#[cfg(unix)]
mod signals;
mod touch;

#[cfg(unix)]
pub use signals::TRAPPED_SIGNALS;

static ACTIVE: AtomicBool = AtomicBool::new(false);
static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Interval used by the touch-file variant unless configured otherwise.
pub const DEFAULT_TOUCH_INTERVAL: Duration = Duration::from_millis(200);

/// Mechanism through which a running service learns about stop requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapMode {
    /// Trap the graceful shutdown signals, chaining to existing handlers.
    #[cfg(unix)]
    Signals,
    /// Poll a termination flag on a fixed interval and consume it when seen.
    /// On Unix the shutdown signals are trapped as well.
    TouchFile {
        /// Termination flag watched by the poller.
        flag: FileFlag,
        /// Delay between polls.
        interval: Duration,
    },
}

enum Installed {
    #[cfg(unix)]
    Signals(signals::Installation),
    TouchFile {
        poller: touch::Poller,
        #[cfg(unix)]
        signals: signals::Installation,
    },
}

/// Active trap session.
///
/// Dropping the session restores the process to the state found at
/// [`SignalSession::start`] and clears the stop-requested bit.
pub struct SignalSession {
    installed: Option<Installed>,
}

impl SignalSession {
    /// Installs the trap described by `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyActive`] when another session is live in
    /// this process, or an installation error when the trap cannot be set up.
    /// Nothing is left installed on error.
    pub fn start(mode: &TrapMode) -> Result<Self, SessionError> {
        if ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SessionError::AlreadyActive);
        }
        STOP_REQUESTED.store(false, Ordering::SeqCst);

        let installed = match mode {
            #[cfg(unix)]
            TrapMode::Signals => signals::Installation::install().map(Installed::Signals),
            TrapMode::TouchFile { flag, interval } => install_touch_file(flag, *interval),
        };
        match installed {
            Ok(installed) => {
                info!(target: SESSION_TARGET, mode = mode.label(), "trap session started");
                Ok(Self {
                    installed: Some(installed),
                })
            }
            Err(error) => {
                ACTIVE.store(false, Ordering::SeqCst);
                Err(error)
            }
        }
    }

    /// Reports whether a session is installed anywhere in this process.
    #[must_use]
    pub fn is_active() -> bool {
        ACTIVE.load(Ordering::SeqCst)
    }

    /// Reports whether a trapped signal or consumed termination flag asked
    /// the service to stop.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        STOP_REQUESTED.load(Ordering::SeqCst)
    }

    /// Ends the session. Equivalent to dropping it.
    pub fn end(self) {
        drop(self);
    }
}

impl Drop for SignalSession {
    fn drop(&mut self) {
        match self.installed.take() {
            #[cfg(unix)]
            Some(Installed::Signals(installation)) => installation.restore(),
            Some(Installed::TouchFile {
                poller,
                #[cfg(unix)]
                signals,
            }) => {
                poller.shutdown();
                #[cfg(unix)]
                signals.restore();
            }
            None => {}
        }
        STOP_REQUESTED.store(false, Ordering::SeqCst);
        ACTIVE.store(false, Ordering::SeqCst);
        debug!(target: SESSION_TARGET, "trap session ended");
    }
}

impl TrapMode {
    /// Platform default: signals on Unix, touch-file polling elsewhere.
    #[must_use]
    pub fn platform_default(term_flag: FileFlag) -> Self {
        #[cfg(unix)]
        {
            drop(term_flag);
            Self::Signals
        }
        #[cfg(not(unix))]
        {
            Self::TouchFile {
                flag: term_flag,
                interval: DEFAULT_TOUCH_INTERVAL,
            }
        }
    }

    /// Whether stop requests travel through the termination flag rather
    /// than a signal.
    #[must_use]
    pub const fn uses_touch_file(&self) -> bool {
        matches!(self, Self::TouchFile { .. })
    }

    const fn label(&self) -> &'static str {
        match self {
            #[cfg(unix)]
            Self::Signals => "signals",
            Self::TouchFile { .. } => "touch_file",
        }
    }
}

#[cfg(unix)]
fn install_touch_file(flag: &FileFlag, interval: Duration) -> Result<Installed, SessionError> {
    let signals = signals::Installation::install()?;
    match touch::Poller::spawn(flag.clone(), interval) {
        Ok(poller) => Ok(Installed::TouchFile { poller, signals }),
        Err(error) => {
            signals.restore();
            Err(error)
        }
    }
}

#[cfg(not(unix))]
fn install_touch_file(flag: &FileFlag, interval: Duration) -> Result<Installed, SessionError> {
    touch::Poller::spawn(flag.clone(), interval).map(|poller| Installed::TouchFile { poller })
}

/// Holds the trapped signals pending on the calling thread between claiming
/// the run lock and installing the session.
///
/// The PID record is visible to stoppers as soon as the lock is claimed; a
/// `SIGTERM` sent in that window is delivered to the trap once the session
/// is in place instead of to the default disposition.
pub(crate) struct PendingSignals {
    #[cfg(unix)]
    _mask: signals::MaskGuard,
}

impl PendingSignals {
    /// Blocks the trapped signals until the returned value is dropped.
    pub(crate) fn hold() -> Self {
        Self {
            #[cfg(unix)]
            _mask: signals::MaskGuard::block_trapped(),
        }
    }
}

fn mark_stop_requested() {
    STOP_REQUESTED.store(true, Ordering::SeqCst);
}

/// Errors raised while starting a [`SignalSession`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// A session is already installed in this process.
    #[error("a signal session is already active in this process")]
    AlreadyActive,
    /// Installing a handler failed.
    #[error("failed to install handler for {signal}: {source}")]
    Install {
        /// Name of the signal whose handler could not be installed.
        signal: &'static str,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Spawning the termination flag poller failed.
    #[error("failed to start termination flag poller: {source}")]
    Spawn {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
