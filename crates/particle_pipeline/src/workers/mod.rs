//! # Worker Loops
//!
//! The three independently paced loops and the state they share.
//!
//! ```text
//!             ┌──────────── PipelineShared ────────────┐
//!             │ physics_gate   display_gate            │
//!             │ handoff (slot_free, frame_ready)       │
//!             │ stats_lock                             │
//!             │ running  paused  frame_available       │
//!             └────────────────────────────────────────┘
//!                 │                │               │
//!          ┌──────┴─────┐   ┌──────┴─────┐   ┌─────┴──────┐
//!          │  Stepper   │   │   Render   │   │  Sampler   │
//!          └────────────┘   └────────────┘   └────────────┘
//! ```
//!
//! Nothing else crosses loop boundaries.
//!
//! ## Exits
//!
//! A loop ends for one of two reasons:
//! - shutdown: Running was cleared, or its wait was interrupted after that
//! - fault: a hook failed, a dispatch failed, or it was interrupted while
//!   Running was still set. A fault clears Running and is recorded.

mod render;
mod sampler;
mod stepper;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use particle_pipeline_core::{BinarySignal, CancelToken, SignalError};
use tracing::{debug, error, warn};

use crate::dispatch::StatsDispatcher;
use crate::error::{HookResult, PipelineError, PipelineResult, ShutdownError};
use crate::handoff::FrameHandoff;
use crate::hooks::PipelineHooks;
use crate::stats::PipelineStats;
use crate::stats_lock::StatsLock;

/// Identifies one of the pipeline's loops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    /// Advances the simulation and publishes frames.
    Stepper,
    /// Redraws the latest frame on every display tick.
    Render,
    /// Periodically refreshes derived statistics.
    Sampler,
}

impl WorkerKind {
    /// Lowercase name used in logs and thread names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stepper => "stepper",
            Self::Render => "render",
            Self::Sampler => "sampler",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a loop body stopped early.
#[derive(Debug)]
pub(crate) enum Exit {
    /// Expected: shutdown was requested.
    Shutdown,
    /// A defect to report.
    Fault(PipelineError),
}

/// Outcome of one step of a loop body.
pub(crate) type Step<T = ()> = Result<T, Exit>;

/// Everything the loops share.
pub(crate) struct PipelineShared {
    pub(crate) hooks: Arc<dyn PipelineHooks>,
    pub(crate) dispatcher: Arc<dyn StatsDispatcher>,
    pub(crate) physics_gate: BinarySignal,
    pub(crate) display_gate: BinarySignal,
    pub(crate) handoff: FrameHandoff,
    pub(crate) stats_lock: StatsLock,
    pub(crate) paused: Arc<AtomicBool>,
    pub(crate) stats: Arc<PipelineStats>,
    pub(crate) sampler_period: Duration,
    running: AtomicBool,
    run: AtomicU64,
    frame_available: AtomicBool,
    fault: Mutex<Option<PipelineError>>,
}

impl PipelineShared {
    pub(crate) fn new(
        hooks: Arc<dyn PipelineHooks>,
        dispatcher: Arc<dyn StatsDispatcher>,
        sampler_period: Duration,
    ) -> Self {
        Self {
            hooks,
            dispatcher,
            physics_gate: BinarySignal::new("physics_gate", false),
            display_gate: BinarySignal::new("display_gate", false),
            handoff: FrameHandoff::new(),
            stats_lock: StatsLock::new(),
            paused: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(PipelineStats::new()),
            sampler_period,
            running: AtomicBool::new(false),
            run: AtomicU64::new(0),
            frame_available: AtomicBool::new(false),
            fault: Mutex::new(None),
        }
    }

    /// Arms every signal and flag for a fresh run.
    ///
    /// Loops, guards and claims left over from earlier runs stop counting.
    pub(crate) fn reset_for_run(&self) {
        self.run.fetch_add(1, Ordering::SeqCst);
        self.handoff.reset();
        self.physics_gate.drain();
        self.display_gate.drain();
        self.stats_lock.reset();
        self.stats.reset();
        self.frame_available.store(false, Ordering::SeqCst);
        *self.fault.lock() = None;
    }

    #[inline]
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn frame_available(&self) -> bool {
        self.frame_available.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_frame_available(&self) {
        self.frame_available.store(true, Ordering::SeqCst);
    }

    /// First fault recorded in this run.
    pub(crate) fn fault(&self) -> Option<PipelineError> {
        self.fault.lock().clone()
    }

    /// Clears Running and records `err` unless an earlier fault is recorded.
    pub(crate) fn record_fault(&self, worker: WorkerKind, err: PipelineError) -> PipelineError {
        self.set_running(false);
        error!(%worker, error = %err, "pipeline fault");
        let mut fault = self.fault.lock();
        if fault.is_none() {
            *fault = Some(err.clone());
        }
        err
    }

    /// Identifier of the current run, bumped by every
    /// [`PipelineShared::reset_for_run`].
    #[inline]
    pub(crate) fn current_run(&self) -> u64 {
        self.run.load(Ordering::SeqCst)
    }
}

/// One loop's view of the pipeline, bound to the run it was spawned for.
///
/// A loop left detached by a stop timeout may wake up after the next
/// `start`. Once its run is no longer current, every interruption it sees
/// is a shutdown and its faults are not recorded.
pub(crate) struct LoopScope<'a> {
    pub(crate) shared: &'a PipelineShared,
    pub(crate) token: &'a CancelToken,
    worker: WorkerKind,
    run: u64,
}

impl<'a> LoopScope<'a> {
    pub(crate) fn new(shared: &'a PipelineShared, token: &'a CancelToken, worker: WorkerKind, run: u64) -> Self {
        Self {
            shared,
            token,
            worker,
            run,
        }
    }

    /// Whether this loop's run is the current one and still Running.
    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        self.shared.is_running() && self.shared.current_run() == self.run
    }

    /// Whether the loop should start another iteration.
    #[inline]
    pub(crate) fn should_continue(&self) -> bool {
        self.is_live() && !self.token.is_cancelled()
    }

    /// Classifies the outcome of a blocking wait.
    pub(crate) fn wait<T>(&self, outcome: Result<T, SignalError>) -> Step<T> {
        match outcome {
            Ok(value) => Ok(value),
            Err(SignalError::Interrupted) if self.is_live() => Err(Exit::Fault(PipelineError::UnexpectedInterrupt {
                worker: self.worker,
            })),
            Err(SignalError::Interrupted) => Err(Exit::Shutdown),
        }
    }

    /// Treats a cancelled token as an interrupted wait.
    ///
    /// Called right after external hooks return, before anything the hook's
    /// result feeds into is published.
    pub(crate) fn checkpoint(&self) -> Step {
        let outcome = if self.token.is_cancelled() {
            Err(SignalError::Interrupted)
        } else {
            Ok(())
        };
        self.wait(outcome)
    }

    /// Classifies the outcome of a collaborator hook.
    pub(crate) fn call(&self, outcome: HookResult) -> Step {
        outcome.map_err(|e| {
            Exit::Fault(PipelineError::HookFailed {
                worker: self.worker,
                reason: e.to_string(),
            })
        })
    }

    /// Converts a loop body's exit into the thread's result.
    pub(crate) fn finish(&self, outcome: Step) -> PipelineResult<()> {
        match outcome {
            Ok(()) | Err(Exit::Shutdown) => {
                debug!(worker = %self.worker, run = self.run, "loop exited");
                Ok(())
            }
            Err(Exit::Fault(err)) if self.shared.current_run() != self.run => {
                warn!(worker = %self.worker, run = self.run, error = %err, "fault after its run ended, not recorded");
                Err(err)
            }
            Err(Exit::Fault(err)) => Err(self.shared.record_fault(self.worker, err)),
        }
    }
}

/// Signals each loop may be parked on, for waking it on interrupt.
fn wake_list(kind: WorkerKind, shared: &PipelineShared) -> Vec<BinarySignal> {
    match kind {
        WorkerKind::Stepper => vec![
            shared.physics_gate.clone(),
            shared.stats_lock.signal().clone(),
            shared.handoff.slot_free().clone(),
        ],
        WorkerKind::Render => vec![shared.display_gate.clone()],
        WorkerKind::Sampler => vec![shared.stats_lock.signal().clone()],
    }
}

/// Sends on drop, so the joiner learns the thread is done even if the body
/// unwinds.
struct ExitNotice(Sender<()>);

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

/// A spawned loop thread with its own cancel token.
pub(crate) struct WorkerHandle {
    kind: WorkerKind,
    token: CancelToken,
    wake: Vec<BinarySignal>,
    exited: Receiver<()>,
    thread: JoinHandle<PipelineResult<()>>,
}

impl WorkerHandle {
    /// Spawns the loop for `kind` on a named thread.
    pub(crate) fn spawn(kind: WorkerKind, shared: &Arc<PipelineShared>) -> PipelineResult<Self> {
        let token = CancelToken::new();
        let run = shared.current_run();
        let (exit_tx, exited) = bounded(1);
        let thread_shared = Arc::clone(shared);
        let thread_token = token.clone();

        let thread = thread::Builder::new()
            .name(format!("pipeline-{kind}"))
            .spawn(move || {
                let _exit = ExitNotice(exit_tx);
                let scope = LoopScope::new(&thread_shared, &thread_token, kind, run);
                match kind {
                    WorkerKind::Stepper => stepper::run(&scope),
                    WorkerKind::Render => render::run(&scope),
                    WorkerKind::Sampler => sampler::run(&scope),
                }
            })
            .map_err(|e| PipelineError::Spawn {
                worker: kind,
                reason: e.to_string(),
            })?;

        Ok(Self {
            kind,
            token,
            wake: wake_list(kind, shared),
            exited,
            thread,
        })
    }

    /// Which loop this is.
    pub(crate) fn kind(&self) -> WorkerKind {
        self.kind
    }

    /// Cancels the loop's token and wakes every signal it may be parked on.
    pub(crate) fn interrupt(&self) {
        self.token.cancel();
        for signal in &self.wake {
            signal.wake_waiters();
        }
    }

    /// Waits up to `timeout` for the loop to end, returning its result.
    ///
    /// On timeout the thread is left detached.
    pub(crate) fn join(self, timeout: Duration) -> PipelineResult<()> {
        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match self.thread.join() {
                Ok(result) => result,
                Err(_) => Err(PipelineError::HookFailed {
                    worker: self.kind,
                    reason: "loop thread panicked".to_string(),
                }),
            },
            Err(RecvTimeoutError::Timeout) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                Err(ShutdownError::timed_out(self.kind, timeout_ms).into())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dispatch::InlineDispatcher;
    use crate::error::HookError;

    /// Hooks that count calls and can be told to fail.
    #[derive(Default)]
    pub(crate) struct CountingHooks {
        pub(crate) advances: AtomicU64,
        pub(crate) publishes: AtomicU64,
        pub(crate) renders: AtomicU64,
        pub(crate) refreshes: AtomicU64,
        pub(crate) fail_advance: AtomicBool,
        pub(crate) fail_refresh: AtomicBool,
    }

    impl PipelineHooks for CountingHooks {
        fn advance_simulation(&self) -> HookResult {
            self.advances.fetch_add(1, Ordering::SeqCst);
            if self.fail_advance.load(Ordering::SeqCst) {
                return Err(HookError::new("integrator diverged"));
            }
            Ok(())
        }
        fn publish_frame(&self) -> HookResult {
            self.publishes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn render_current_frame(&self) -> HookResult {
            self.renders.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn refresh_statistics(&self) -> HookResult {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.fail_refresh.load(Ordering::SeqCst) {
                return Err(HookError::new("stats unavailable"));
            }
            Ok(())
        }
    }

    pub(crate) fn shared_with(hooks: &Arc<CountingHooks>, sampler_period: Duration) -> Arc<PipelineShared> {
        let shared = PipelineShared::new(
            Arc::clone(hooks) as Arc<dyn PipelineHooks>,
            Arc::new(InlineDispatcher),
            sampler_period,
        );
        shared.reset_for_run();
        shared.set_running(true);
        Arc::new(shared)
    }

    pub(crate) fn wait_until(what: &str, condition: impl Fn() -> bool) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(std::time::Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_worker_names() {
        assert_eq!(WorkerKind::Stepper.to_string(), "stepper");
        assert_eq!(WorkerKind::Render.as_str(), "render");
        assert_eq!(format!("{}", WorkerKind::Sampler), "sampler");
    }

    #[test]
    fn test_wait_classification() {
        let hooks = Arc::new(CountingHooks::default());
        let shared = shared_with(&hooks, Duration::from_secs(1));
        let token = CancelToken::new();
        let scope = LoopScope::new(&shared, &token, WorkerKind::Render, shared.current_run());

        let step = scope.wait(Err::<(), _>(SignalError::Interrupted));
        assert!(matches!(
            step,
            Err(Exit::Fault(PipelineError::UnexpectedInterrupt { worker: WorkerKind::Render }))
        ));

        shared.set_running(false);
        let step = scope.wait(Err::<(), _>(SignalError::Interrupted));
        assert!(matches!(step, Err(Exit::Shutdown)));
    }

    #[test]
    fn test_loop_from_ended_run_cannot_fault_next_run() {
        let hooks = Arc::new(CountingHooks::default());
        let shared = shared_with(&hooks, Duration::from_secs(1));
        let token = CancelToken::new();
        let scope = LoopScope::new(&shared, &token, WorkerKind::Render, shared.current_run());
        token.cancel();

        // Stop, then start again while the old loop is still inside a hook.
        shared.set_running(false);
        shared.reset_for_run();
        shared.set_running(true);

        assert!(!scope.should_continue());
        assert!(matches!(scope.checkpoint(), Err(Exit::Shutdown)));
        let late = scope.finish(Err(Exit::Fault(PipelineError::HookFailed {
            worker: WorkerKind::Render,
            reason: "device lost".to_string(),
        })));
        assert!(late.is_err());
        assert!(shared.is_running());
        assert_eq!(shared.fault(), None);
    }

    #[test]
    fn test_first_fault_wins() {
        let hooks = Arc::new(CountingHooks::default());
        let shared = shared_with(&hooks, Duration::from_secs(1));

        shared.record_fault(WorkerKind::Sampler, PipelineError::RefreshDropped);
        shared.record_fault(WorkerKind::Render, PipelineError::UnexpectedInterrupt { worker: WorkerKind::Render });

        assert!(!shared.is_running());
        assert_eq!(shared.fault(), Some(PipelineError::RefreshDropped));

        shared.reset_for_run();
        assert_eq!(shared.fault(), None);
    }

    #[test]
    fn test_join_times_out_on_stuck_loop() {
        let hooks = Arc::new(CountingHooks::default());
        let shared = shared_with(&hooks, Duration::from_secs(1));

        // Holding the stats lock parks the stepper right after its first gate.
        let guard = shared.stats_lock.try_lock().unwrap();
        shared.handoff.prime();
        shared.physics_gate.release();
        let stepper = WorkerHandle::spawn(WorkerKind::Stepper, &shared).unwrap();
        wait_until("stepper parked on the lock", || shared.stats_lock.signal().waiting() == 1);

        // Not interrupted, so it stays parked.
        let (token, wake) = (stepper.token.clone(), stepper.wake.clone());
        let err = stepper.join(Duration::from_millis(20)).unwrap_err();
        assert_eq!(err, PipelineError::Shutdown(ShutdownError::Stepper { timeout_ms: 20 }));

        shared.set_running(false);
        token.cancel();
        for signal in &wake {
            signal.wake_waiters();
        }
        drop(guard);
    }
}
