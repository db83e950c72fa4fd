//! Pure transition function of the lifecycle machine.
//!
//! Nothing here performs I/O. The driver samples the world into [`Inputs`],
//! asks [`transition`] for the next state, and carries out the returned
//! [`Effect`] itself.

/// Lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Initial state.
    Ready,
    /// Dispatch hub evaluated before every step.
    Status,
    /// Attempting to claim the run lock.
    Lock,
    /// Invoking the callback once.
    Run,
    /// Waiting one poll interval without invoking the callback.
    Pause,
    /// Tearing down the session and lock.
    Stop,
    /// Terminal state.
    Term(Outcome),
}

/// How the machine reached [`State::Term`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The loop ran and was stopped or finished.
    Completed,
    /// Another process held the run lock.
    Contention,
}

/// Observations feeding a transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Inputs {
    /// The persisted stop flag is raised.
    pub stop_flag: bool,
    /// A trapped signal or termination flag requested a stop.
    pub stop_requested: bool,
    /// The callback reported that it has no more work.
    pub finished: bool,
    /// The persisted pause flag is raised.
    pub pause_flag: bool,
    /// This machine holds the run lock.
    pub lock_held: bool,
}

/// Side effect the driver performs when entering the next state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Nothing to do.
    None,
    /// Attempt to claim the run lock.
    AcquireLock,
    /// Install the trap session after a successful claim.
    InstallSession,
    /// Invoke the callback exactly once.
    InvokeCallback,
    /// Sleep one poll interval.
    Sleep,
    /// Release the session, then the lock.
    Teardown,
}

/// Computes the next state and the effect that accompanies it.
#[must_use]
pub const fn transition(state: State, inputs: &Inputs) -> (State, Effect) {
    match state {
        State::Ready | State::Pause | State::Run => (State::Status, Effect::None),
        State::Status => dispatch(inputs),
        State::Lock => {
            if inputs.lock_held {
                (State::Status, Effect::InstallSession)
            } else {
                (State::Term(Outcome::Contention), Effect::None)
            }
        }
        State::Stop => (State::Term(Outcome::Completed), Effect::Teardown),
        State::Term(outcome) => (State::Term(outcome), Effect::None),
    }
}

const fn dispatch(inputs: &Inputs) -> (State, Effect) {
    if inputs.stop_flag || inputs.stop_requested || inputs.finished {
        (State::Stop, Effect::None)
    } else if inputs.pause_flag {
        (State::Pause, Effect::Sleep)
    } else if !inputs.lock_held {
        (State::Lock, Effect::AcquireLock)
    } else {
        (State::Run, Effect::InvokeCallback)
    }
}
