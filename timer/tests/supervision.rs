//! End-to-end supervision behavior: the four outcomes, halt rotation,
//! reentrancy rejection, and independence of sequential runs.

use std::future::pending;
use std::time::{Duration, Instant};

use tokio::task::yield_now;
use tokio::time::sleep;

use vigil_timer::{CompletedBy, Timer, TimerError};

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

async fn until_running<A, E>(timer: &Timer<A, E>) {
    while !timer.is_running() {
        yield_now().await;
    }
}

#[tokio::test]
async fn action_finishing_first_yields_its_result() {
    // Deadline 1 second; action sleeps 0 seconds then returns 1.
    let timer: Timer<u32, String> = Timer::new(Duration::from_secs(1));
    let result = timer
        .run(async {
            sleep(Duration::ZERO).await;
            Ok(1)
        })
        .await;

    assert_eq!(result, Ok(1));
    assert_eq!(timer.last_outcome(), Some(CompletedBy::Action));
    assert_eq!(timer.last_result(), Some(1));
    assert_eq!(timer.last_failure(), None);
    assert!(!timer.is_running());
}

#[tokio::test]
async fn action_outliving_the_deadline_yields_timeout() {
    // Deadline 0 seconds; the action cannot finish first.
    let timer: Timer<u32, String> = Timer::new(Duration::ZERO);
    let result = timer
        .run(async {
            sleep(Duration::from_secs(1)).await;
            Ok(1)
        })
        .await;

    assert_eq!(result, Err(TimerError::Timeout));
    assert_eq!(timer.last_outcome(), Some(CompletedBy::Timeout));
    assert_eq!(timer.last_result(), None);
}

#[tokio::test]
async fn action_failure_is_surfaced_unchanged() {
    let timer: Timer<u32, String> = Timer::new(Duration::from_secs(1));
    let result = timer.run(async { Err("boom".to_string()) }).await;

    assert_eq!(result, Err(TimerError::Action("boom".to_string())));
    assert_eq!(timer.last_outcome(), Some(CompletedBy::Failure));
    assert_eq!(timer.last_failure(), Some("boom".to_string()));
    assert_eq!(timer.last_result(), None);
}

#[tokio::test]
async fn halt_during_a_run_yields_halted() {
    let timer: Timer<u32, String> = Timer::new(Duration::from_secs(5));
    let handle = tokio::spawn({
        let timer = timer.clone();
        async move { timer.run(pending()).await }
    });

    until_running(&timer).await;
    timer.halt();

    let result = handle.await.expect("run task must not panic");
    assert_eq!(result, Err(TimerError::Halted));
    assert_eq!(timer.last_outcome(), Some(CompletedBy::Halt));

    // The consumed halt signal was rotated out: the next run is unaffected.
    assert_eq!(timer.run(async { Ok(2) }).await, Ok(2));
    assert_eq!(timer.last_outcome(), Some(CompletedBy::Action));
}

#[tokio::test]
async fn halt_while_idle_affects_no_run() {
    let timer: Timer<u32, String> = Timer::new(Duration::from_secs(1));
    timer.halt();
    timer.halt();

    assert_eq!(timer.last_outcome(), None);
    assert_eq!(timer.run(async { Ok(4) }).await, Ok(4));
    assert_eq!(timer.last_outcome(), Some(CompletedBy::Action));
}

#[tokio::test]
async fn reentrant_run_is_rejected_without_disturbing_the_race() {
    let timer: Timer<u32, String> = Timer::new(Duration::from_secs(5));
    let handle = tokio::spawn({
        let timer = timer.clone();
        async move { timer.run(pending()).await }
    });

    until_running(&timer).await;
    let rejected = timer.run(async { Ok(9) }).await;
    assert_eq!(rejected, Err(TimerError::NotReady));
    assert!(timer.is_running());

    timer.halt();
    assert_eq!(
        handle.await.expect("run task must not panic"),
        Err(TimerError::Halted)
    );
    // The rejected call left no trace on the in-flight run's verdict.
    assert_eq!(timer.last_outcome(), Some(CompletedBy::Halt));
    assert_eq!(timer.last_result(), None);
}

#[tokio::test]
async fn sequential_runs_are_independent() {
    let timer: Timer<u32, String> = Timer::new(ms(50));

    assert_eq!(timer.run(async { Ok(10) }).await, Ok(10));
    assert_eq!(timer.last_outcome(), Some(CompletedBy::Action));

    assert_eq!(timer.run(pending()).await, Err(TimerError::Timeout));
    assert_eq!(timer.last_outcome(), Some(CompletedBy::Timeout));
    assert_eq!(timer.last_result(), None);

    assert_eq!(timer.run(async { Ok(11) }).await, Ok(11));
    assert_eq!(timer.last_outcome(), Some(CompletedBy::Action));
    assert_eq!(timer.last_result(), Some(11));
}

#[tokio::test]
async fn late_action_cannot_overwrite_a_timeout() {
    let timer: Timer<u32, String> = Timer::new(ms(40));
    let result = timer
        .run(async {
            sleep(ms(150)).await;
            Ok(1)
        })
        .await;
    assert_eq!(result, Err(TimerError::Timeout));

    // Let the losing action arm settle in the background.
    sleep(ms(200)).await;
    assert_eq!(timer.last_outcome(), Some(CompletedBy::Timeout));
    assert_eq!(timer.last_result(), None);
}

#[tokio::test]
async fn leftover_deadline_arm_cannot_pollute_a_settled_run() {
    let timer: Timer<u32, String> = Timer::new(ms(60));
    assert_eq!(timer.run(async { Ok(1) }).await, Ok(1));

    // The first run's deadline arm fires while the timer is idle; the
    // recorded verdict must stand.
    sleep(ms(120)).await;
    assert_eq!(timer.last_outcome(), Some(CompletedBy::Action));
    assert_eq!(timer.last_result(), Some(1));
}

#[tokio::test]
async fn deadline_elapsed_is_immediate_while_idle() {
    let timer: Timer<u32, String> = Timer::new(Duration::from_secs(60));
    timer.deadline_elapsed().await;
}

#[tokio::test]
async fn deadline_elapsed_tracks_the_deadline_arm_even_when_the_action_wins() {
    let timer: Timer<u32, String> = Timer::new(ms(120));
    let handle = tokio::spawn({
        let timer = timer.clone();
        async move {
            timer
                .run(async {
                    sleep(ms(30)).await;
                    Ok(5)
                })
                .await
        }
    });

    until_running(&timer).await;
    let started = Instant::now();
    timer.deadline_elapsed().await;

    // The budget elapses well after the action already won the race.
    assert!(started.elapsed() >= ms(80));
    assert_eq!(handle.await.expect("run task must not panic"), Ok(5));
    assert_eq!(timer.last_outcome(), Some(CompletedBy::Action));
}

#[tokio::test]
async fn halt_request_does_not_leak_across_timers() {
    let left: Timer<u32, String> = Timer::new(Duration::from_secs(5));
    let right: Timer<u32, String> = Timer::new(Duration::from_secs(5));

    let handle = tokio::spawn({
        let left = left.clone();
        async move { left.run(pending()).await }
    });
    until_running(&left).await;

    right.halt();
    assert!(left.is_running());

    left.halt();
    assert_eq!(
        handle.await.expect("run task must not panic"),
        Err(TimerError::Halted)
    );
}
