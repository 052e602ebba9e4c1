//! Stepper Loop: advances the simulation once per physics tick and hands
//! each result to the renderer.
//!
//! ```text
//! publish initial frame
//! loop:
//!   physics_gate.acquire      (blocks while paused, unless single-stepped)
//!   stats_lock ─┬─ advance_simulation
//!               └─ unlock
//!   slot_free.acquire         (backpressure: renderer must free the slot)
//!   publish_frame
//!   frame_available = true
//!   frame_ready.release
//! ```

use tracing::{debug, trace};

use super::{LoopScope, Step};
use crate::error::PipelineResult;


pub(crate) fn run(scope: &LoopScope<'_>) -> PipelineResult<()> {
    debug!("stepper loop started");
    let outcome = hand_off(scope).and_then(|()| step_loop(scope));
    scope.finish(outcome)
}

fn step_loop(scope: &LoopScope<'_>) -> Step {
    while scope.should_continue() {
        scope.wait(scope.shared.physics_gate.acquire(scope.token))?;
        advance(scope)?;
        hand_off(scope)?;
    }
    Ok(())
}

fn advance(scope: &LoopScope<'_>) -> Step {
    let shared = scope.shared;
    let _stats = scope.wait(shared.stats_lock.lock(scope.token))?;
    scope.call(shared.hooks.advance_simulation())?;
    scope.checkpoint()?;
    shared.stats.record_step();
    trace!("simulation advanced");
    Ok(())
}

/// Publishes the current state through the single-slot handoff.
fn hand_off(scope: &LoopScope<'_>) -> Step {
    let shared = scope.shared;
    let slot = scope.wait(shared.handoff.wait_for_slot(scope.token))?;
    scope.call(shared.hooks.publish_frame())?;
    scope.checkpoint()?;
    shared.stats.record_publish();
    shared.mark_frame_available();
    slot.deposit();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::WorkerKind;
    use crate::error::PipelineError;
    use crate::workers::tests::{shared_with, wait_until, CountingHooks};
    use crate::workers::PipelineShared;
    use particle_pipeline_core::CancelToken;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    const WORKER: WorkerKind = WorkerKind::Stepper;

    fn spawn(shared: &Arc<PipelineShared>, token: &CancelToken) -> thread::JoinHandle<PipelineResult<()>> {
        let (shared, token) = (Arc::clone(shared), token.clone());
        thread::spawn(move || run(&LoopScope::new(&shared, &token, WORKER, shared.current_run())))
    }

    fn stop(shared: &PipelineShared, token: &CancelToken) {
        shared.set_running(false);
        token.cancel();
        shared.physics_gate.wake_waiters();
        shared.handoff.slot_free().wake_waiters();
        shared.stats_lock.signal().wake_waiters();
    }

    #[test]
    fn test_publishes_initial_frame_without_advancing() {
        let hooks = Arc::new(CountingHooks::default());
        let shared = shared_with(&hooks, Duration::from_secs(1));
        let token = CancelToken::new();
        shared.handoff.prime();

        let handle = spawn(&shared, &token);
        wait_until("initial frame", || shared.handoff.in_flight() == 1);
        assert!(shared.frame_available());

        assert_eq!(hooks.publishes.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.advances.load(Ordering::SeqCst), 0);

        stop(&shared, &token);
        assert_eq!(handle.join().unwrap(), Ok(()));
    }

    #[test]
    fn test_one_step_per_physics_release() {
        let hooks = Arc::new(CountingHooks::default());
        let shared = shared_with(&hooks, Duration::from_secs(1));
        let token = CancelToken::new();
        shared.handoff.prime();
        let handle = spawn(&shared, &token);

        for expected in 1..=5 {
            // Act as the renderer: consume the pending frame, free the slot.
            wait_until("frame ready", || shared.handoff.in_flight() == 1);
            drop(shared.handoff.try_claim());
            shared.physics_gate.release();
            wait_until("step", || hooks.advances.load(Ordering::SeqCst) == expected);
        }

        thread::sleep(Duration::from_millis(20));
        assert_eq!(hooks.advances.load(Ordering::SeqCst), 5);

        stop(&shared, &token);
        assert_eq!(handle.join().unwrap(), Ok(()));
    }

    #[test]
    fn test_backpressure_bounds_lead() {
        let hooks = Arc::new(CountingHooks::default());
        let shared = shared_with(&hooks, Duration::from_secs(1));
        let token = CancelToken::new();
        shared.handoff.prime();
        let handle = spawn(&shared, &token);

        // Nobody consumes frames: the initial frame fills the slot, one more
        // step can be computed, and then the stepper blocks on the slot.
        shared.physics_gate.release();
        wait_until("stepper parked on slot", || shared.handoff.slot_free().waiting() == 1);
        shared.physics_gate.release();
        thread::sleep(Duration::from_millis(20));

        assert_eq!(hooks.advances.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.publishes.load(Ordering::SeqCst), 1);
        assert!(shared.handoff.in_flight() <= 1);

        stop(&shared, &token);
        assert_eq!(handle.join().unwrap(), Ok(()));
    }

    #[test]
    fn test_hook_failure_is_fatal_and_unlocks() {
        let hooks = Arc::new(CountingHooks::default());
        hooks.fail_advance.store(true, Ordering::SeqCst);
        let shared = shared_with(&hooks, Duration::from_secs(1));
        let token = CancelToken::new();
        shared.handoff.prime();
        shared.physics_gate.release();

        let result = spawn(&shared, &token).join().unwrap();

        assert!(matches!(
            result,
            Err(PipelineError::HookFailed { worker: WorkerKind::Stepper, .. })
        ));
        assert!(!shared.is_running());
        assert!(!shared.stats_lock.is_locked());
        assert!(shared.fault().is_some());
    }

    #[test]
    fn test_interrupt_while_running_is_a_fault() {
        let hooks = Arc::new(CountingHooks::default());
        let shared = shared_with(&hooks, Duration::from_secs(1));
        let token = CancelToken::new();
        shared.handoff.prime();
        let handle = spawn(&shared, &token);
        wait_until("stepper parked on gate", || shared.physics_gate.waiting() == 1);

        // Interrupt without clearing Running first.
        token.cancel();
        shared.physics_gate.wake_waiters();

        assert_eq!(
            handle.join().unwrap(),
            Err(PipelineError::UnexpectedInterrupt { worker: WorkerKind::Stepper })
        );
        assert!(!shared.is_running());
    }

    #[test]
    fn test_interrupt_after_shutdown_is_swallowed() {
        let hooks = Arc::new(CountingHooks::default());
        let shared = shared_with(&hooks, Duration::from_secs(1));
        let token = CancelToken::new();
        shared.handoff.prime();
        let handle = spawn(&shared, &token);
        wait_until("stepper parked on gate", || shared.physics_gate.waiting() == 1);

        stop(&shared, &token);
        assert_eq!(handle.join().unwrap(), Ok(()));
        assert_eq!(shared.fault(), None);
    }
}
