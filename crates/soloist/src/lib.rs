//! Cooperative single-instance services coordinated through the filesystem.
//!
//! A named service lives in a directory shared by every process that wants to
//! run or control it. Ownership is decided by an exclusively created lock
//! file; the owner publishes its PID in a record beside it. Plain flag files
//! let any process stop or pause the owner, which observes them between
//! invocations of its callback.
//!
//! ```text
//! <dir>/<name>.lock     holder PID, created exclusively
//! <dir>/<name>.pid      holder PID, truncated on release
//! <dir>/<name>.stopped  stop flag
//! <dir>/<name>.paused   pause flag
//! <dir>/<name>.term     termination flag for the touch-file trap
//! ```
//!
//! [`ServiceHandle`] is the entry point. It drives a [`LifecycleMachine`]
//! that claims the [`RunLock`], installs a [`SignalSession`] so that
//! `SIGTERM` and friends request a graceful stop, and tears both down again
//! on every exit path.

mod error;
mod flag;
mod handle;
mod identity;
mod lock;
mod machine;
mod session;

#[cfg(test)]
mod test_support;
#[cfg(test)]
mod tests;

pub use error::ServiceError;
pub use flag::{FileFlag, Flag, FlagError, MemoryFlag};
pub use handle::{DEFAULT_POLL_INTERVAL, RemoteStop, ServiceHandle};
pub use identity::{IdentityError, ServiceIdentity};
pub use lock::{LockError, LockToken, RunLock, STARTUP_GRACE};
pub use machine::{
    Collaborators, Effect, Inputs, LifecycleMachine, Outcome, RunReport, State, transition,
};
#[cfg(unix)]
pub use session::TRAPPED_SIGNALS;
pub use session::{DEFAULT_TOUCH_INTERVAL, SessionError, SignalSession, TrapMode};

pub(crate) const FLAG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::flag");
pub(crate) const LOCK_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lock");
pub(crate) const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");
pub(crate) const MACHINE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::machine");
pub(crate) const HANDLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::handle");
