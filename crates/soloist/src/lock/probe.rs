//! Zero-effect liveness probes and termination requests aimed at other
//! processes.

use std::io;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{Signal, kill};
#[cfg(unix)]
use nix::unistd::Pid;

/// Reports whether `pid` names a live process.
///
/// PID 0 and values outside the platform's PID range are never alive; they
/// would otherwise address a process group.
#[cfg(unix)]
pub(crate) fn is_alive(pid: u32) -> io::Result<bool> {
    let Some(target) = as_pid(pid) else {
        return Ok(false);
    };
    match kill(target, None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

/// Without a probe the safest answer is that the process may still run.
#[cfg(not(unix))]
pub(crate) fn is_alive(pid: u32) -> io::Result<bool> {
    Ok(pid != 0)
}

/// Asks `pid` to shut down gracefully with `SIGTERM`.
#[cfg(unix)]
pub(crate) fn request_termination(pid: u32) -> io::Result<()> {
    let Some(target) = as_pid(pid) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("pid {pid} does not address a single process"),
        ));
    };
    kill(target, Signal::SIGTERM).map_err(io::Error::from)
}

#[cfg(unix)]
fn as_pid(pid: u32) -> Option<Pid> {
    match i32::try_from(pid) {
        Ok(raw) if raw > 0 => Some(Pid::from_raw(raw)),
        _ => None,
    }
}
