//! `sigaction`-based trap that chains to the handlers it displaces.
//!
//! The previous handler for each trapped signal is mirrored into lock-free
//! atomics so the trap can reach it from signal context. Installation and
//! restoration run with the trapped signals blocked on the calling thread.

use std::io;
use std::mem;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use libc::{c_int, c_void, siginfo_t};
use nix::sys::signal::{
    SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal, pthread_sigmask, sigaction,
};
use tracing::warn;

use super::{SessionError, mark_stop_requested};
use crate::SESSION_TARGET;

/// Graceful shutdown signals trapped by a session.
pub const TRAPPED_SIGNALS: [Signal; 4] = [
    Signal::SIGTERM,
    Signal::SIGINT,
    Signal::SIGPIPE,
    Signal::SIGHUP,
];

const KIND_NONE: u8 = 0;
const KIND_HANDLER: u8 = 1;
const KIND_SIGINFO: u8 = 2;

struct ChainSlot {
    kind: AtomicU8,
    address: AtomicUsize,
}

impl ChainSlot {
    const fn empty() -> Self {
        Self {
            kind: AtomicU8::new(KIND_NONE),
            address: AtomicUsize::new(0),
        }
    }

    fn record(&self, handler: SigHandler) {
        let (kind, address) = match handler {
            SigHandler::Handler(function) => (KIND_HANDLER, function as usize),
            SigHandler::SigAction(function) => (KIND_SIGINFO, function as usize),
            SigHandler::SigDfl | SigHandler::SigIgn => (KIND_NONE, 0),
        };
        self.address.store(address, Ordering::SeqCst);
        self.kind.store(kind, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.kind.store(KIND_NONE, Ordering::SeqCst);
        self.address.store(0, Ordering::SeqCst);
    }
}

static CHAIN: [ChainSlot; TRAPPED_SIGNALS.len()] = [const { ChainSlot::empty() }; 4];

extern "C" fn trap(signum: c_int, info: *mut siginfo_t, context: *mut c_void) {
    mark_stop_requested();
    let slot = TRAPPED_SIGNALS
        .iter()
        .position(|signal| *signal as c_int == signum)
        .and_then(|index| CHAIN.get(index));
    let Some(slot) = slot else {
        return;
    };
    let address = slot.address.load(Ordering::SeqCst);
    match slot.kind.load(Ordering::SeqCst) {
        KIND_HANDLER => {
            // SAFETY: the address was taken from a `SigHandler::Handler`
            // function pointer of exactly this type.
            let previous: extern "C" fn(c_int) = unsafe { mem::transmute(address) };
            previous(signum);
        }
        KIND_SIGINFO => {
            // SAFETY: the address was taken from a `SigHandler::SigAction`
            // function pointer of exactly this type.
            let previous: extern "C" fn(c_int, *mut siginfo_t, *mut c_void) =
                unsafe { mem::transmute(address) };
            previous(signum, info, context);
        }
        _ => {}
    }
}

/// Handlers displaced by the trap, restored signal by signal on teardown.
pub(super) struct Installation {
    previous: Vec<(Signal, SigAction)>,
}

impl Installation {
    pub(super) fn install() -> Result<Self, SessionError> {
        let action = SigAction::new(
            SigHandler::SigAction(trap),
            SaFlags::SA_SIGINFO | SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        let blocked = MaskGuard::block_trapped();
        let mut installation = Self {
            previous: Vec::with_capacity(TRAPPED_SIGNALS.len()),
        };
        for (signal, slot) in TRAPPED_SIGNALS.iter().zip(CHAIN.iter()) {
            // SAFETY: `trap` only touches atomics and calls handlers that were
            // already installed for the same signal.
            let previous = match unsafe { sigaction(*signal, &action) } {
                Ok(previous) => previous,
                Err(errno) => {
                    installation.restore_installed();
                    drop(blocked);
                    return Err(SessionError::Install {
                        signal: signal.as_str(),
                        source: io::Error::from(errno),
                    });
                }
            };
            slot.record(previous.handler());
            installation.previous.push((*signal, previous));
        }
        drop(blocked);
        Ok(installation)
    }

    pub(super) fn restore(mut self) {
        let blocked = MaskGuard::block_trapped();
        self.restore_installed();
        drop(blocked);
    }

    fn restore_installed(&mut self) {
        for (signal, previous) in self.previous.drain(..) {
            // SAFETY: reinstates the action the kernel reported for this
            // signal before the session started.
            if let Err(errno) = unsafe { sigaction(signal, &previous) } {
                warn!(
                    target: SESSION_TARGET,
                    signal = signal.as_str(),
                    error = %errno,
                    "failed to restore signal handler"
                );
            }
        }
        for slot in &CHAIN {
            slot.clear();
        }
    }
}

/// Blocks the trapped signals on the calling thread until dropped.
pub(super) struct MaskGuard {
    previous: Option<SigSet>,
}

impl MaskGuard {
    pub(super) fn block_trapped() -> Self {
        let mut set = SigSet::empty();
        for signal in TRAPPED_SIGNALS {
            set.add(signal);
        }
        let mut previous = SigSet::empty();
        match pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut previous)) {
            Ok(()) => Self {
                previous: Some(previous),
            },
            Err(errno) => {
                warn!(
                    target: SESSION_TARGET,
                    error = %errno,
                    "failed to block trapped signals"
                );
                Self { previous: None }
            }
        }
    }
}

impl Drop for MaskGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take()
            && let Err(errno) = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&previous), None)
        {
            warn!(
                target: SESSION_TARGET,
                error = %errno,
                "failed to restore signal mask"
            );
        }
    }
}
