//! Drives the lifecycle state machine against real flags, the run lock and
//! the trap session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::MACHINE_TARGET;
use crate::error::ServiceError;
use crate::flag::Flag;
use crate::lock::{LockToken, RunLock};
use crate::session::{PendingSignals, SignalSession, TrapMode};

mod transition;

pub use transition::{Effect, Inputs, Outcome, State, transition};

/// Collaborators the machine coordinates.
pub struct Collaborators<'a> {
    /// Persisted stop flag.
    pub stop: &'a dyn Flag,
    /// Persisted pause flag.
    pub pause: &'a dyn Flag,
    /// Run lock guarding the service.
    pub lock: &'a RunLock,
    /// Trap installed once the lock is held.
    pub trap: &'a TrapMode,
    /// Sleep between pause polls.
    pub poll_interval: Duration,
    /// Mirrors whether this machine holds the lock, for observers on other
    /// threads.
    pub holding: &'a AtomicBool,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// How the machine terminated.
    pub outcome: Outcome,
    /// Whether the callback was invoked at least once.
    pub reached_run: bool,
    /// Number of callback invocations.
    pub invocations: u64,
}

/// Single run of the lifecycle machine.
///
/// Dropping the machine on an error path runs the same teardown as
/// [`State::Stop`].
pub struct LifecycleMachine<'a> {
    collaborators: Collaborators<'a>,
    session: Option<SignalSession>,
    token: Option<LockToken>,
    pending: Option<PendingSignals>,
    finished: bool,
    invocations: u64,
}

impl<'a> LifecycleMachine<'a> {
    /// Builds a machine in the [`State::Ready`] state.
    #[must_use]
    pub const fn new(collaborators: Collaborators<'a>) -> Self {
        Self {
            collaborators,
            session: None,
            token: None,
            pending: None,
            finished: false,
            invocations: 0,
        }
    }

    /// Runs the machine to [`State::Term`], invoking `callback` once per
    /// [`State::Run`] visit.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] on unexpected I/O or when the trap session
    /// cannot be installed. The session and lock are released on every path.
    pub fn run<F>(mut self, mut callback: F) -> Result<RunReport, ServiceError>
    where
        F: FnMut() -> bool,
    {
        let mut state = State::Ready;
        let mut reached_run = false;
        loop {
            let inputs = self.observe(state)?;
            let (next, effect) = transition(state, &inputs);
            debug!(target: MACHINE_TARGET, from = ?state, to = ?next, ?effect, "transition");
            reached_run |= next == State::Run;
            self.apply(effect, &mut callback)?;
            state = next;
            if let State::Term(outcome) = state {
                return Ok(RunReport {
                    outcome,
                    reached_run,
                    invocations: self.invocations,
                });
            }
        }
    }

    fn observe(&self, state: State) -> Result<Inputs, ServiceError> {
        let lock_held = self.token.is_some();
        if state != State::Status {
            return Ok(Inputs {
                lock_held,
                finished: self.finished,
                ..Inputs::default()
            });
        }
        Ok(Inputs {
            stop_flag: self.collaborators.stop.is_set()?,
            stop_requested: self
                .session
                .as_ref()
                .is_some_and(SignalSession::stop_requested),
            finished: self.finished,
            pause_flag: self.collaborators.pause.is_set()?,
            lock_held,
        })
    }

    fn apply<F>(&mut self, effect: Effect, callback: &mut F) -> Result<(), ServiceError>
    where
        F: FnMut() -> bool,
    {
        match effect {
            Effect::None => {}
            Effect::AcquireLock => {
                // Stop signals wait until the trap exists to receive them.
                let pending = PendingSignals::hold();
                self.token = self.collaborators.lock.acquire()?;
                if self.token.is_some() {
                    self.collaborators.holding.store(true, Ordering::SeqCst);
                    self.pending = Some(pending);
                }
            }
            Effect::InstallSession => {
                self.session = Some(SignalSession::start(self.collaborators.trap)?);
                self.pending = None;
            }
            Effect::InvokeCallback => {
                self.invocations += 1;
                if !callback() {
                    debug!(
                        target: MACHINE_TARGET,
                        invocations = self.invocations,
                        "callback reported completion"
                    );
                    self.finished = true;
                }
            }
            Effect::Sleep => thread::sleep(self.collaborators.poll_interval),
            Effect::Teardown => self.teardown(),
        }
        Ok(())
    }

    fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            session.end();
        }
        if let Some(token) = self.token.take() {
            self.collaborators.holding.store(false, Ordering::SeqCst);
            token.release();
            info!(
                target: MACHINE_TARGET,
                invocations = self.invocations,
                "service loop finished"
            );
        }
        self.pending = None;
    }
}

impl Drop for LifecycleMachine<'_> {
    fn drop(&mut self) {
        self.teardown();
    }
}
