//! The deadline-bounded action supervisor.
//!
//! One [`Timer`] supervises one action execution at a time, racing it
//! against a deadline arm and a halt arm. Outcome assignment is
//! first-write-wins: whichever arm records first decides the run, and arms
//! settling later for the same run (or for an earlier run) change nothing.

use std::fmt;
use std::future::Future;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, trace};

use vigil_types::{CompletedBy, TimerError};

use crate::awaiter::{Awaiter, TokioAwaiter};

/// Supervises one asynchronous action per run against a fixed deadline and
/// an external halt request.
///
/// The deadline duration is set once at construction and reused identically
/// on every [`run`](Self::run); there is no per-call override. Cloning a
/// `Timer` yields another handle to the same instance, which is how a halt
/// request reaches a run in progress from elsewhere:
///
/// ```
/// use std::time::Duration;
/// use vigil_timer::Timer;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let timer: Timer<u32, String> = Timer::new(Duration::from_secs(1));
/// let result = timer.run(async { Ok(1) }).await;
/// assert_eq!(result, Ok(1));
///
/// let handle = timer.clone();
/// handle.halt(); // idle halt: the next run starts unhalted
/// assert_eq!(timer.run(async { Ok(2) }).await, Ok(2));
/// # }
/// ```
pub struct Timer<A, E> {
    shared: Arc<Shared<A, E>>,
}

struct Shared<A, E> {
    deadline: Duration,
    awaiter: Arc<dyn Awaiter>,
    inner: Mutex<Inner<A, E>>,
}

struct Inner<A, E> {
    running: bool,
    /// Bumped at the start of every run; arms record only for their own run.
    epoch: u64,
    outcome: Option<CompletedBy>,
    result: Option<A>,
    failure: Option<E>,
    /// The pending halt signal: fired by `halt()`, rotated on every halt so
    /// each run's halt arm is consumed at most once.
    halt_tx: watch::Sender<()>,
    halt_rx: watch::Receiver<()>,
    /// Settles when the current run's deadline arm does, regardless of
    /// which arm decided the outcome.
    deadline_rx: Option<watch::Receiver<()>>,
    /// Wakes the current `run` once an arm has recorded an outcome.
    settled_tx: Option<watch::Sender<()>>,
}

impl<A, E> Inner<A, E> {
    /// First-write-wins outcome assignment for the run identified by
    /// `epoch`. Returns whether this call was the deciding write.
    fn record(&mut self, epoch: u64, outcome: CompletedBy) -> bool {
        if self.epoch != epoch || self.outcome.is_some() {
            return false;
        }
        self.outcome = Some(outcome);
        if let Some(settled) = &self.settled_tx {
            let _ = settled.send(());
        }
        true
    }
}

impl<A, E> Shared<A, E> {
    fn lock(&self) -> MutexGuard<'_, Inner<A, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Receivers and senders wired up for one run.
struct RunArms {
    epoch: u64,
    settled_rx: watch::Receiver<()>,
    halt_rx: watch::Receiver<()>,
    deadline_tx: watch::Sender<()>,
}

/// Resets the running flag even when the `run` future is dropped mid-race.
struct RunGuard<'a, A, E> {
    shared: &'a Shared<A, E>,
}

impl<A, E> Drop for RunGuard<'_, A, E> {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.running = false;
        inner.settled_tx = None;
    }
}

impl<A, E> Timer<A, E> {
    /// Whether a run is currently in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// How the most recently settled run completed; `None` before any run.
    #[must_use]
    pub fn last_outcome(&self) -> Option<CompletedBy> {
        self.shared.lock().outcome
    }

    /// The deadline budget applied to every run.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.shared.deadline
    }

    /// Requests cancellation of the run in progress.
    ///
    /// Effective only while running: the current run's outcome becomes
    /// [`CompletedBy::Halt`] (unless another arm already decided it) and
    /// its halt arm fires. A fresh pending signal is rotated in either way,
    /// so a subsequent run is never halted by a stale request.
    pub fn halt(&self) {
        let (halt_tx, halt_rx) = watch::channel(());
        let mut inner = self.shared.lock();
        let previous = mem::replace(&mut inner.halt_tx, halt_tx);
        inner.halt_rx = halt_rx;

        if !inner.running {
            // Nothing to cancel; the fresh signal arms a future run.
            return;
        }

        let epoch = inner.epoch;
        if inner.record(epoch, CompletedBy::Halt) {
            debug!("halt recorded for the active run");
        }
        drop(inner);
        let _ = previous.send(());
    }

    /// Suspends until the current run's deadline arm settles, independent
    /// of which arm decides the outcome. Returns immediately when no run is
    /// active.
    pub async fn deadline_elapsed(&self) {
        let deadline_rx = {
            let inner = self.shared.lock();
            if !inner.running {
                return;
            }
            inner.deadline_rx.clone()
        };
        if let Some(mut deadline_rx) = deadline_rx {
            let _ = deadline_rx.changed().await;
        }
    }
}

impl<A, E> Timer<A, E>
where
    A: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// A timer over the real clock with the given deadline budget.
    #[must_use]
    pub fn new(deadline: Duration) -> Self {
        Self::with_awaiter(deadline, Arc::new(TokioAwaiter))
    }

    /// A timer whose deadline arm waits through the supplied awaiter.
    #[must_use]
    pub fn with_awaiter(deadline: Duration, awaiter: Arc<dyn Awaiter>) -> Self {
        let (halt_tx, halt_rx) = watch::channel(());
        Self {
            shared: Arc::new(Shared {
                deadline,
                awaiter,
                inner: Mutex::new(Inner {
                    running: false,
                    epoch: 0,
                    outcome: None,
                    result: None,
                    failure: None,
                    halt_tx,
                    halt_rx,
                    deadline_rx: None,
                    settled_tx: None,
                }),
            }),
        }
    }

    /// Runs `action` raced against the deadline and the pending halt
    /// signal, resuming exactly once with whichever settles first.
    ///
    /// Fails synchronously with [`TimerError::NotReady`] if a run is
    /// already in progress; concurrent calls are rejected, never queued.
    /// Losing arms are left to settle in the background and their output is
    /// discarded; in particular a late-finishing action cannot overwrite a
    /// timeout or halt verdict.
    pub async fn run<F>(&self, action: F) -> Result<A, TimerError<E>>
    where
        F: Future<Output = Result<A, E>> + Send + 'static,
    {
        let arms = self.begin()?;
        let guard = RunGuard {
            shared: &self.shared,
        };
        debug!(epoch = arms.epoch, deadline = ?self.shared.deadline, "run started");

        self.spawn_deadline_arm(arms.epoch, arms.deadline_tx);
        self.spawn_action_arm(arms.epoch, action);

        let mut settled_rx = arms.settled_rx;
        let mut halt_rx = arms.halt_rx;
        tokio::select! {
            _ = settled_rx.changed() => {}
            _ = halt_rx.changed() => {}
        }

        let (outcome, result, failure) = {
            let inner = self.shared.lock();
            (inner.outcome, inner.result.clone(), inner.failure.clone())
        };
        drop(guard);
        debug!(?outcome, "run settled");

        match outcome {
            Some(CompletedBy::Action) => match result {
                Some(value) => Ok(value),
                None => Err(TimerError::Halted),
            },
            Some(CompletedBy::Failure) => match failure {
                Some(value) => Err(TimerError::Action(value)),
                None => Err(TimerError::Halted),
            },
            Some(CompletedBy::Timeout) => Err(TimerError::Timeout),
            // A wake without a recorded outcome can only come from the
            // halt arm.
            Some(CompletedBy::Halt) | None => Err(TimerError::Halted),
        }
    }

    /// The most recently settled run's result; `None` before any run or
    /// when the latest run did not complete by action.
    #[must_use]
    pub fn last_result(&self) -> Option<A> {
        self.shared.lock().result.clone()
    }

    /// The most recently settled run's failure value; `None` before any
    /// run or when the latest run did not complete by failure.
    #[must_use]
    pub fn last_failure(&self) -> Option<E> {
        self.shared.lock().failure.clone()
    }

    /// Reentrancy guard plus per-run wiring; synchronous and side-effect
    /// free on rejection.
    fn begin(&self) -> Result<RunArms, TimerError<E>> {
        let mut inner = self.shared.lock();
        if inner.running {
            return Err(TimerError::NotReady);
        }
        inner.running = true;
        inner.epoch += 1;
        inner.outcome = None;
        inner.result = None;
        inner.failure = None;

        let (settled_tx, settled_rx) = watch::channel(());
        inner.settled_tx = Some(settled_tx);
        let (deadline_tx, deadline_rx) = watch::channel(());
        inner.deadline_rx = Some(deadline_rx);

        Ok(RunArms {
            epoch: inner.epoch,
            settled_rx,
            halt_rx: inner.halt_rx.clone(),
            deadline_tx,
        })
    }

    fn spawn_deadline_arm(&self, epoch: u64, deadline_tx: watch::Sender<()>) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            shared.awaiter.wait_for(shared.deadline).await;
            let mut inner = shared.lock();
            if inner.record(epoch, CompletedBy::Timeout) {
                trace!(epoch, "deadline arm recorded timeout");
            }
            drop(inner);
            // Settles the deadline arm for `deadline_elapsed` waiters even
            // when another arm decided the outcome.
            let _ = deadline_tx.send(());
        });
    }

    fn spawn_action_arm<F>(&self, epoch: u64, action: F)
    where
        F: Future<Output = Result<A, E>> + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let output = action.await;
            let mut inner = shared.lock();
            if inner.epoch == epoch && inner.outcome.is_none() {
                match output {
                    Ok(value) => {
                        inner.result = Some(value);
                        inner.record(epoch, CompletedBy::Action);
                    }
                    Err(failure) => {
                        inner.failure = Some(failure);
                        inner.record(epoch, CompletedBy::Failure);
                    }
                }
            } else {
                // The race is already decided; drain the loser silently.
                trace!(epoch, "action settled after the race, output discarded");
            }
        });
    }
}

impl<A, E> Clone for Timer<A, E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A, E> fmt::Debug for Timer<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("deadline", &self.shared.deadline)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
