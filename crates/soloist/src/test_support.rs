//! Helpers shared by unit and behavioural tests.

use std::process::Command;
use std::sync::{Mutex, MutexGuard, PoisonError};

static SESSION_LOCK: Mutex<()> = Mutex::new(());

/// Serialises tests that install the process-wide trap session.
pub(crate) fn session_guard() -> MutexGuard<'static, ()> {
    SESSION_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// PID of a child that has already exited and been reaped.
pub(crate) fn dead_pid() -> u32 {
    let mut child = Command::new("true").spawn().expect("spawn child");
    let pid = child.id();
    child.wait().expect("reap child");
    pid
}
