//! Deadline-bounded, cancellable supervision of asynchronous actions.
//!
//! A [`Timer`] runs one caller-supplied action per run and resumes the
//! caller exactly once, with a result that unambiguously identifies which
//! of four outcomes happened first: the action finished, the action failed,
//! the deadline elapsed, or an external [`Timer::halt`] arrived.
//!
//! Time itself is reached through the [`Awaiter`] abstraction so that
//! deadline logic can be tested deterministically: production timers use
//! [`TokioAwaiter`], tests inject a [`RecordingAwaiter`] that resolves
//! immediately while remembering the requested duration.

mod awaiter;
mod timer;

pub use awaiter::{Awaiter, RecordingAwaiter, TokioAwaiter, remaining_until};
pub use timer::Timer;

pub use vigil_types::{CompletedBy, TimerError};
