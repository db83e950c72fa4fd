//! Behavioural tests covering the service loop and remote stop requests.

use std::cell::RefCell;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use super::support::{POLL_INTERVAL, ServiceWorld, StepResult, StopAttempt};
use crate::handle::RemoteStop;

const PAUSE_OBSERVATION: Duration = Duration::from_millis(150);

#[fixture]
fn world() -> RefCell<ServiceWorld> {
    RefCell::new(ServiceWorld::new())
}

#[given("a fresh service slot")]
fn given_fresh_slot(world: &RefCell<ServiceWorld>) {
    let _ = world;
}

#[given("the stop flag is raised")]
fn given_stop_flag(world: &RefCell<ServiceWorld>) -> StepResult {
    world
        .borrow()
        .handle
        .stop()
        .map_err(|error| error.to_string())
}

#[given("a child process is recorded as the holder")]
fn given_exiting_holder(world: &RefCell<ServiceWorld>) -> StepResult {
    world.borrow_mut().record_exiting_holder()
}

#[given("a child process ignoring SIGTERM is recorded as the holder")]
fn given_stubborn_holder(world: &RefCell<ServiceWorld>) -> StepResult {
    world.borrow_mut().record_stubborn_holder()
}

#[given("the handle uses the touch-file trap")]
fn given_touch_file(world: &RefCell<ServiceWorld>) -> StepResult {
    world.borrow_mut().use_touch_file()
}

#[given("a child process watching the termination flag is recorded as the holder")]
fn given_touch_file_holder(world: &RefCell<ServiceWorld>) -> StepResult {
    world.borrow_mut().record_touch_file_holder()
}

#[when("the service runs a callback that completes after {count} invocations")]
fn when_runs_to_completion(world: &RefCell<ServiceWorld>, count: u64) -> StepResult {
    let mut world = world.borrow_mut();
    let mut invocations = 0;
    let ran = world
        .handle
        .service(|| {
            invocations += 1;
            invocations < count
        })
        .map_err(|error| error.to_string())?;
    world.observed.ran = Some(ran);
    world.observed.invocations = invocations;
    Ok(())
}

#[when("the service is stopped from another thread after {count} invocations")]
fn when_stopped_from_thread(world: &RefCell<ServiceWorld>, count: u64) -> StepResult {
    let mut world = world.borrow_mut();
    let counter = AtomicU64::new(0);
    let handle = &world.handle;
    let (ran, at_stop) = thread::scope(|scope| {
        let stopper = scope.spawn(|| {
            while counter.load(Ordering::SeqCst) < count {
                thread::sleep(Duration::from_millis(2));
            }
            handle.stop().map(|()| counter.load(Ordering::SeqCst))
        });
        let ran = handle.service(|| {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            true
        });
        (ran, stopper.join())
    });
    let ran = ran.map_err(|error| error.to_string())?;
    let at_stop = at_stop
        .map_err(|_| "stopper thread panicked".to_string())?
        .map_err(|error| error.to_string())?;
    world.observed.ran = Some(ran);
    world.observed.invocations_at_stop = Some(at_stop);
    world.observed.invocations = counter.load(Ordering::SeqCst);
    Ok(())
}

#[when("the service is paused after {count} invocations and later resumed")]
fn when_paused_and_resumed(world: &RefCell<ServiceWorld>, count: u64) -> StepResult {
    let mut world = world.borrow_mut();
    let counter = AtomicU64::new(0);
    let handle = &world.handle;
    let limit = count * 2;
    let (ran, observed) = thread::scope(|scope| {
        let observer = scope.spawn(|| -> Result<(u64, bool), String> {
            while !handle.is_paused().map_err(|error| error.to_string())? {
                thread::sleep(POLL_INTERVAL);
            }
            thread::sleep(PAUSE_OBSERVATION);
            let held = handle.is_running().map_err(|error| error.to_string())?;
            let seen = counter.load(Ordering::SeqCst);
            handle.resume().map_err(|error| error.to_string())?;
            Ok((seen, held))
        });
        let ran = handle.service(|| {
            let seen = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if seen == count {
                handle.pause().ok();
            }
            seen < limit
        });
        (ran, observer.join())
    });
    let ran = ran.map_err(|error| error.to_string())?;
    let (seen, held) = observed.map_err(|_| "observer thread panicked".to_string())??;
    world.observed.ran = Some(ran);
    world.observed.invocations_while_paused = Some(seen);
    world.observed.held_while_paused = Some(held);
    world.observed.invocations = counter.load(Ordering::SeqCst);
    Ok(())
}

#[when("a remote stop is requested with a {seconds} second timeout")]
fn when_remote_stop(world: &RefCell<ServiceWorld>, seconds: u64) -> StepResult {
    let mut world = world.borrow_mut();
    let timeout = Duration::from_secs(seconds);
    let started = Instant::now();
    let outcome = world
        .handle
        .request_remote_stop(timeout, Duration::from_millis(20))
        .map_err(|error| error.to_string())?;
    world.stop_attempt = Some(StopAttempt {
        outcome,
        elapsed: started.elapsed(),
        timeout,
    });
    Ok(())
}

#[then("the callback was invoked {count} times")]
fn then_invoked(world: &RefCell<ServiceWorld>, count: u64) {
    assert_eq!(world.borrow().observed.invocations, count);
}

#[then("the callback was never invoked")]
fn then_never_invoked(world: &RefCell<ServiceWorld>) {
    assert_eq!(world.borrow().observed.invocations, 0);
}

#[then("the service reported that it ran")]
fn then_reported_ran(world: &RefCell<ServiceWorld>) {
    assert_eq!(world.borrow().observed.ran, Some(true));
}

#[then("the service reported that it did not run")]
fn then_reported_not_ran(world: &RefCell<ServiceWorld>) {
    assert_eq!(world.borrow().observed.ran, Some(false));
}

#[then("no process holds the service")]
fn then_not_held(world: &RefCell<ServiceWorld>) {
    let world = world.borrow();
    assert_eq!(world.handle.running_pid().expect("running pid"), None);
    assert!(
        !world.handle.identity().lock_path().exists(),
        "lock file should be removed once the service returns"
    );
    assert!(!world.handle.is_running().expect("is running"));
}

#[then("the callback advanced at most once after the stop")]
fn then_advanced_at_most_once(world: &RefCell<ServiceWorld>) {
    let world = world.borrow();
    let at_stop = world
        .observed
        .invocations_at_stop
        .expect("stop should have been requested");
    assert!(
        world.observed.invocations <= at_stop + 1,
        "callback ran {} times after the stop at {at_stop}",
        world.observed.invocations - at_stop
    );
}

#[then("the callback stayed at {count} invocations while paused")]
fn then_stayed_while_paused(world: &RefCell<ServiceWorld>, count: u64) {
    assert_eq!(world.borrow().observed.invocations_while_paused, Some(count));
}

#[then("the lock stayed held while paused")]
fn then_held_while_paused(world: &RefCell<ServiceWorld>) {
    assert_eq!(world.borrow().observed.held_while_paused, Some(true));
}

#[then("the remote stop reports that the holder exited")]
fn then_holder_exited(world: &RefCell<ServiceWorld>) {
    let world = world.borrow();
    let attempt = world.stop_attempt.as_ref().expect("stop attempt");
    assert!(
        matches!(attempt.outcome, RemoteStop::Stopped { pid } if pid != process::id()),
        "unexpected outcome: {:?}",
        attempt.outcome
    );
}

#[then("the termination flag was consumed")]
fn then_term_consumed(world: &RefCell<ServiceWorld>) {
    let world = world.borrow();
    assert!(!world.handle.identity().term_path().exists());
}

#[then("the remote stop reports that the holder is still running")]
fn then_holder_still_running(world: &RefCell<ServiceWorld>) {
    let world = world.borrow();
    let attempt = world.stop_attempt.as_ref().expect("stop attempt");
    assert!(
        matches!(attempt.outcome, RemoteStop::StillRunning { .. }),
        "unexpected outcome: {:?}",
        attempt.outcome
    );
}

#[then("the remote stop reports that nothing was running")]
fn then_nothing_running(world: &RefCell<ServiceWorld>) {
    let world = world.borrow();
    let attempt = world.stop_attempt.as_ref().expect("stop attempt");
    assert_eq!(attempt.outcome, RemoteStop::NotRunning);
}

#[then("the request returned before the timeout")]
fn then_returned_early(world: &RefCell<ServiceWorld>) {
    let world = world.borrow();
    let attempt = world.stop_attempt.as_ref().expect("stop attempt");
    assert!(
        attempt.elapsed < attempt.timeout,
        "request took {:?}",
        attempt.elapsed
    );
}

#[then("the request waited for the timeout")]
fn then_waited_for_timeout(world: &RefCell<ServiceWorld>) {
    let world = world.borrow();
    let attempt = world.stop_attempt.as_ref().expect("stop attempt");
    assert!(
        attempt.elapsed >= attempt.timeout,
        "request returned after {:?}",
        attempt.elapsed
    );
    assert!(
        attempt.elapsed < attempt.timeout * 2,
        "request overran: {:?}",
        attempt.elapsed
    );
}

#[scenario(
    path = "tests/features/service_lifecycle.feature",
    name = "Callback runs until it reports completion"
)]
fn callback_runs_to_completion(world: RefCell<ServiceWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/service_lifecycle.feature",
    name = "Stop requested from another thread ends the loop"
)]
fn stop_from_another_thread(world: RefCell<ServiceWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/service_lifecycle.feature",
    name = "Pause keeps the lock without invoking the callback"
)]
fn pause_keeps_lock(world: RefCell<ServiceWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/service_lifecycle.feature",
    name = "A raised stop flag prevents the service from starting"
)]
fn stop_flag_prevents_start(world: RefCell<ServiceWorld>) {
    let _ = world;
}

#[cfg(unix)]
#[scenario(
    path = "tests/features/service_lifecycle.feature",
    name = "Remote stop reaches a holder that exits on SIGTERM"
)]
fn remote_stop_reaches_exiting_holder(world: RefCell<ServiceWorld>) {
    let _ = world;
}

#[cfg(unix)]
#[scenario(
    path = "tests/features/service_lifecycle.feature",
    name = "Remote stop times out against a holder ignoring SIGTERM"
)]
fn remote_stop_times_out(world: RefCell<ServiceWorld>) {
    let _ = world;
}

#[cfg(unix)]
#[scenario(
    path = "tests/features/service_lifecycle.feature",
    name = "Remote stop through the termination flag reaches a touch-file holder"
)]
fn remote_stop_through_termination_flag(world: RefCell<ServiceWorld>) {
    let _ = world;
}

#[scenario(
    path = "tests/features/service_lifecycle.feature",
    name = "Remote stop without a holder reports nothing to stop"
)]
fn remote_stop_without_holder(world: RefCell<ServiceWorld>) {
    let _ = world;
}
