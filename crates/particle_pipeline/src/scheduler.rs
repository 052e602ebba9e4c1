//! # Scheduler
//!
//! Owns the lifecycle of the clock and the three loops.
//!
//! ```text
//!          start                 set_paused(true)
//!   Idle ─────────> Running ─────────────────────> Paused
//!    ^                 │  <─────────────────────     │
//!    │                 │     set_paused(false)       │
//!    └─────────────────┴───────── stop ──────────────┘
//! ```
//!
//! ## Start
//!
//! Every signal is re-armed so nothing from an earlier run leaks into the new
//! one, then the loops are spawned (render, sampler, stepper) and the clock
//! begins ticking. With a periodic clock the first tick fires immediately, so
//! the loops do not wait a full period for their first iteration.
//!
//! ## Stop
//!
//! Running is cleared, the timer is stopped, then each loop is interrupted
//! and joined in turn: render, sampler, stepper. A loop still alive after the
//! timeout is reported by name and the rest are cancelled without waiting.
//!
//! ## Faults
//!
//! A loop that fails (hook error, dropped refresh, unexpected interrupt)
//! clears Running, which winds the other loops down. The fault stays readable
//! through [`Scheduler::fault`] and is returned by the next [`Scheduler::stop`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use particle_pipeline_core::CancelToken;
use tracing::{error, info, warn};

use crate::clock::{ClockThread, PipelineClock};
use crate::config::PipelineConfig;
use crate::dispatch::{InlineDispatcher, StatsDispatcher};
use crate::error::{PipelineError, PipelineResult};
use crate::hooks::PipelineHooks;
use crate::stats::PipelineStatsSnapshot;
use crate::workers::{PipelineShared, WorkerHandle, WorkerKind};

/// Spawn order; also the order loops are stopped in.
const LOOP_ORDER: [WorkerKind; 3] = [WorkerKind::Render, WorkerKind::Sampler, WorkerKind::Stepper];

/// Observable lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    /// Not started, or stopped.
    Idle,
    /// Loops running, physics ticking.
    Running,
    /// Loops running, physics withheld.
    Paused,
    /// A loop failed; waiting for [`Scheduler::stop`] to collect it.
    Faulted,
}

#[derive(Default)]
struct Lifecycle {
    ever_started: bool,
    run: Option<RunHandles>,
}

struct RunHandles {
    timer: Option<ClockThread>,
    workers: Vec<WorkerHandle>,
}

/// Frame pipeline scheduler.
///
/// All methods take `&self` and may be called from any thread.
pub struct Scheduler {
    config: PipelineConfig,
    shared: Arc<PipelineShared>,
    clock: PipelineClock,
    lifecycle: Mutex<Lifecycle>,
}

impl Scheduler {
    /// Creates a scheduler that refreshes statistics on the sampler thread.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` fails validation.
    pub fn new<H: PipelineHooks>(config: PipelineConfig, hooks: Arc<H>) -> PipelineResult<Self> {
        Self::with_dispatcher(config, hooks, InlineDispatcher)
    }

    /// Creates a scheduler that hands statistics refreshes to `dispatcher`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` fails validation.
    pub fn with_dispatcher<H: PipelineHooks, D: StatsDispatcher>(
        config: PipelineConfig,
        hooks: Arc<H>,
        dispatcher: D,
    ) -> PipelineResult<Self> {
        config.validate()?;
        let shared = Arc::new(PipelineShared::new(
            hooks,
            Arc::new(dispatcher),
            config.sampler_period(),
        ));
        let clock = PipelineClock::new(
            shared.physics_gate.clone(),
            shared.display_gate.clone(),
            Arc::clone(&shared.paused),
            Arc::clone(&shared.stats),
        );
        Ok(Self {
            config,
            shared,
            clock,
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }

    /// Arms all signals and starts the loops and the clock.
    ///
    /// The run starts Running, or Paused when `start_paused` is configured;
    /// a pause left over from the previous run does not carry over.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::AlreadyRunning`] if a run has not been stopped
    /// - [`PipelineError::Spawn`] / [`PipelineError::ClockSpawn`] if a
    ///   thread cannot be created; loops already spawned are torn down
    pub fn start(&self) -> PipelineResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.run.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }

        self.shared.reset_for_run();
        self.clock.set_paused(self.config.start_paused);
        self.shared.set_running(true);

        let mut workers = Vec::with_capacity(LOOP_ORDER.len());
        for kind in LOOP_ORDER {
            match WorkerHandle::spawn(kind, &self.shared) {
                Ok(worker) => workers.push(worker),
                Err(err) => {
                    self.abandon_start(workers);
                    return Err(err);
                }
            }
        }

        let timer = match self.config.clock_interval() {
            Some(interval) => {
                // First tick now, not one period from now.
                self.clock.tick();
                match self.clock.spawn(interval, CancelToken::new()) {
                    Ok(timer) => Some(timer),
                    Err(e) => {
                        self.abandon_start(workers);
                        return Err(PipelineError::ClockSpawn(e.to_string()));
                    }
                }
            }
            None => None,
        };

        lifecycle.ever_started = true;
        lifecycle.run = Some(RunHandles { timer, workers });
        info!(
            clock = ?self.config.clock,
            paused = self.clock.is_paused(),
            "frame pipeline started"
        );
        Ok(())
    }

    /// Pauses or resumes the simulation. Rendering keeps running.
    ///
    /// Pausing drains any pending physics tick, so no step slips through
    /// after this returns. The next `start` clears the flag again.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotStarted`] before the first `start`.
    pub fn set_paused(&self, paused: bool) -> PipelineResult<()> {
        let lifecycle = self.lifecycle.lock();
        if !lifecycle.ever_started {
            return Err(PipelineError::NotStarted);
        }
        self.clock.set_paused(paused);
        info!(paused, "pause changed");
        Ok(())
    }

    /// Lets exactly one simulation step through, paused or not.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotStarted`] before the first `start`.
    pub fn advance_one_frame(&self) -> PipelineResult<()> {
        let lifecycle = self.lifecycle.lock();
        if !lifecycle.ever_started {
            return Err(PipelineError::NotStarted);
        }
        self.clock.step_once();
        info!("single step");
        Ok(())
    }

    /// Stops the clock and the loops, waiting up to `timeout` per loop.
    ///
    /// Stopping an idle scheduler that has run before does nothing.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NotStarted`] before the first `start`
    /// - [`PipelineError::Shutdown`] naming the first loop that outlived
    ///   `timeout`; the stepper has its own variant
    /// - otherwise, the first fault recorded during the run
    pub fn stop(&self, timeout: Duration) -> PipelineResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        if !lifecycle.ever_started {
            return Err(PipelineError::NotStarted);
        }
        let Some(run) = lifecycle.run.take() else {
            return Ok(());
        };

        self.shared.set_running(false);
        if let Some(timer) = run.timer {
            timer.stop();
        }

        let mut failure = None;
        let mut workers = run.workers.into_iter();
        while let Some(worker) = workers.next() {
            let kind = worker.kind();
            worker.interrupt();
            match worker.join(timeout) {
                Ok(()) => {}
                Err(err @ PipelineError::Shutdown(_)) => {
                    warn!(worker = %kind, ?timeout, "loop did not stop in time");
                    for rest in workers {
                        rest.interrupt();
                    }
                    return Err(err);
                }
                Err(err) => {
                    if failure.is_none() {
                        failure = Some(err);
                    }
                }
            }
        }

        info!("frame pipeline stopped");
        match self.shared.fault().or(failure) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Whether the loops are running. Cleared by `stop` and by a fault.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Whether physics ticks are withheld.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.clock.is_paused()
    }

    /// Whether the current run has published a frame yet.
    #[must_use]
    pub fn frame_available(&self) -> bool {
        self.shared.frame_available()
    }

    /// First fault recorded in the current or most recent run.
    #[must_use]
    pub fn fault(&self) -> Option<PipelineError> {
        self.shared.fault()
    }

    /// Counters for the current or most recent run.
    #[must_use]
    pub fn stats(&self) -> PipelineStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Handle to the clock. With a manual clock this is the only tick source.
    #[must_use]
    pub fn clock(&self) -> &PipelineClock {
        &self.clock
    }

    /// The configuration this scheduler was built with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        if self.lifecycle.lock().run.is_none() {
            SchedulerState::Idle
        } else if !self.shared.is_running() {
            SchedulerState::Faulted
        } else if self.clock.is_paused() {
            SchedulerState::Paused
        } else {
            SchedulerState::Running
        }
    }

    /// Tears down loops spawned by a `start` that could not finish.
    fn abandon_start(&self, workers: Vec<WorkerHandle>) {
        self.shared.set_running(false);
        for worker in workers {
            let kind = worker.kind();
            worker.interrupt();
            if let Err(err) = worker.join(self.config.shutdown_timeout()) {
                warn!(worker = %kind, error = %err, "loop left behind by failed start");
            }
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.lifecycle.get_mut().run.is_none() {
            return;
        }
        if let Err(err) = self.stop(self.config.shutdown_timeout()) {
            error!(error = %err, "frame pipeline did not stop cleanly on drop");
        }
    }
}
