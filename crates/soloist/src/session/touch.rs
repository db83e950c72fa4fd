//! Touch-file variant of the trap for platforms without usable signals.
//!
//! A background timer polls the termination flag. Seeing it raises the
//! stop-requested bit and consumes the flag, so one touch produces exactly one
//! stop request. A flag already present when polling starts counts as a
//! request; leftovers from earlier runs are cleared before the lock is
//! claimed.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use super::{SessionError, mark_stop_requested};
use crate::SESSION_TARGET;
use crate::flag::{FileFlag, Flag};

pub(super) struct Poller {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl Poller {
    pub(super) fn spawn(flag: FileFlag, interval: Duration) -> Result<Self, SessionError> {
        let (shutdown, ticks) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("soloist-term-poll".to_owned())
            .spawn(move || {
                loop {
                    match ticks.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => poll_once(&flag),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|source| SessionError::Spawn { source })?;
        Ok(Self { shutdown, handle })
    }

    pub(super) fn shutdown(self) {
        // The poller may already have exited; a closed channel is fine.
        self.shutdown.send(()).ok();
        if self.handle.join().is_err() {
            warn!(target: SESSION_TARGET, "termination flag poller panicked");
        }
    }
}

fn poll_once(flag: &FileFlag) {
    match flag.is_set() {
        Ok(true) => {
            info!(
                target: SESSION_TARGET,
                file = %flag.path().display(),
                "termination flag observed"
            );
            mark_stop_requested();
            flag.unset_quietly();
        }
        Ok(false) => {}
        Err(error) => {
            warn!(target: SESSION_TARGET, %error, "failed to poll termination flag");
        }
    }
}
