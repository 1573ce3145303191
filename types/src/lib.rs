//! Core domain types for vigil.
//!
//! This crate contains pure domain types with no IO, no async, and minimal
//! dependencies: the outcome classification of a supervised run and the
//! error taxonomy surfaced by the supervisor.

use thiserror::Error;

/// Which of the three race arms settled a run.
///
/// Exactly one value is recorded per run; arms that settle after the first
/// write never alter it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletedBy {
    /// The caller's action finished and produced a result.
    Action,
    /// The caller's action finished by raising a failure.
    Failure,
    /// The deadline arm settled before the action did.
    Timeout,
    /// An external `halt()` settled the run.
    Halt,
}

impl CompletedBy {
    /// Whether this outcome carries the action's own verdict (result or
    /// failure) as opposed to a supervision verdict (timeout or halt).
    #[must_use]
    pub fn is_action_verdict(self) -> bool {
        matches!(self, Self::Action | Self::Failure)
    }
}

/// Everything `run` can fail with.
///
/// `Action` re-surfaces the action's own failure value unchanged; the other
/// three identify supervision conditions and carry no payload. Retry policy
/// is a caller concern - none of these are retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError<E> {
    /// `run` was called while a run was already in progress. Synchronous,
    /// no state was mutated; always recoverable by the caller.
    #[error("timer is not ready")]
    NotReady,
    /// The supplied action raised a failure before any other arm settled.
    #[error("action failed")]
    Action(E),
    /// The deadline elapsed before the action finished.
    #[error("action didn't finish in time")]
    Timeout,
    /// The run was halted by an external request.
    #[error("timer was halted")]
    Halted,
}

impl<E> TimerError<E> {
    /// The action's failure value, if this is an `Action` error.
    #[must_use]
    pub fn into_action_failure(self) -> Option<E> {
        match self {
            Self::Action(failure) => Some(failure),
            Self::NotReady | Self::Timeout | Self::Halted => None,
        }
    }
}
