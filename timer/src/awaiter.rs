//! The suspension primitive behind every deadline.
//!
//! [`Awaiter`] is the one seam between the supervisor and wall-clock time.
//! It is injected into a [`Timer`](crate::Timer) at construction, so tests
//! swap in [`RecordingAwaiter`] per instance instead of mutating any
//! process-wide binding; there is nothing to restore on teardown.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, ready};
use tokio::time::sleep;

/// Remaining budget until `deadline`, measured from `now`.
///
/// Truncated to whole seconds (fractional remainder toward zero) and
/// clamped at zero: a past or present deadline is an already-elapsed wait,
/// never a negative-duration error.
#[must_use]
pub fn remaining_until(deadline: SystemTime, now: SystemTime) -> Duration {
    let remaining = deadline.duration_since(now).unwrap_or_default();
    Duration::from_secs(remaining.as_secs())
}

/// Suspends the caller for a duration or until a point in time.
///
/// Implementations settle the returned future with no value once the
/// requested time has passed. The trait is dyn-compatible so timers can
/// hold `Arc<dyn Awaiter>`.
pub trait Awaiter: Send + Sync {
    /// Settle after `duration` has elapsed.
    fn wait_for(&self, duration: Duration) -> BoxFuture<'static, ()>;

    /// Settle once `deadline` has passed.
    ///
    /// A deadline already in the past behaves as a zero-duration wait.
    fn wait_until(&self, deadline: SystemTime) -> BoxFuture<'static, ()> {
        self.wait_for(remaining_until(deadline, SystemTime::now()))
    }
}

/// Production awaiter: real elapsed time via the tokio clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioAwaiter;

impl Awaiter for TokioAwaiter {
    fn wait_for(&self, duration: Duration) -> BoxFuture<'static, ()> {
        sleep(duration).boxed()
    }
}

/// Deterministic test double: resolves immediately, remembers the request.
///
/// Time-dependent logic can assert on [`waited`](Self::waited) without any
/// real delay having occurred.
#[derive(Debug, Default)]
pub struct RecordingAwaiter {
    waited: Mutex<Option<Duration>>,
}

impl RecordingAwaiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently requested wait duration, if any.
    #[must_use]
    pub fn waited(&self) -> Option<Duration> {
        *self
            .waited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Awaiter for RecordingAwaiter {
    fn wait_for(&self, duration: Duration) -> BoxFuture<'static, ()> {
        *self
            .waited
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(duration);
        ready(()).boxed()
    }
}
