//! # Statistics Dispatch
//!
//! The sampler does not refresh statistics itself: it hands a
//! [`RefreshJob`] to whatever context owns the statistics display (a UI
//! thread, an event loop) and waits for the job to report back.
//!
//! ```text
//! Sampler                     Dispatcher                 Owner context
//! ───────                     ──────────                 ─────────────
//! lock stats ──> RefreshJob ──> dispatch() ──────────────> job.run()
//!                  (guard)                                  ├─ refresh_statistics()
//!                                                           ├─ drop guard (unlock)
//! wait <──────────────────────────────────────────────────── └─ report outcome
//! ```
//!
//! ## Guaranteed release
//!
//! The job owns the Stats Mutex guard. The lock is released when the job
//! finishes *or* when the job is dropped without running (queue full,
//! owner gone). A dropped job also disconnects its completion channel, so
//! the sampler learns the refresh never happened instead of waiting forever.
//!
//! A job still queued when its run stopped is discarded when the owner gets
//! to it: the next `start` has already reset the lock, so running the hook
//! would race the new run's stepper.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, warn};

use crate::error::HookResult;
use crate::hooks::PipelineHooks;
use crate::stats::PipelineStats;
use crate::stats_lock::StatsGuard;

/// One statistics refresh, carrying the lock it runs under.
pub struct RefreshJob {
    hooks: Arc<dyn PipelineHooks>,
    /// Dropped before `done` so the lock is free before the sampler resumes.
    guard: Option<StatsGuard>,
    done: Sender<HookResult>,
    stats: Arc<PipelineStats>,
}

impl RefreshJob {
    pub(crate) fn new(
        hooks: Arc<dyn PipelineHooks>,
        guard: StatsGuard,
        done: Sender<HookResult>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            hooks,
            guard: Some(guard),
            done,
            stats,
        }
    }

    /// Runs the refresh, unlocks, then reports the outcome to the sampler.
    ///
    /// A job whose run has ended no longer holds the lock, so it is
    /// discarded without calling the hook.
    pub fn run(mut self) {
        if self.guard.as_ref().map_or(true, StatsGuard::is_stale) {
            debug!("discarding refresh from an ended run");
            return;
        }
        let outcome = self.hooks.refresh_statistics();
        if outcome.is_ok() {
            self.stats.record_refresh();
        }
        drop(self.guard.take());
        // The sampler may already have been interrupted.
        let _ = self.done.send(outcome);
    }
}

impl fmt::Debug for RefreshJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshJob")
            .field("holds_lock", &self.guard.is_some())
            .finish_non_exhaustive()
    }
}

/// Hands refresh jobs to the context that owns statistics state.
pub trait StatsDispatcher: Send + Sync + 'static {
    /// Schedules `job` to run. Dropping it instead is allowed and is
    /// reported to the sampler as a dispatch failure.
    fn dispatch(&self, job: RefreshJob);
}

/// Runs refresh jobs immediately on the sampler thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineDispatcher;

impl StatsDispatcher for InlineDispatcher {
    fn dispatch(&self, job: RefreshJob) {
        job.run();
    }
}

/// Sends refresh jobs over a bounded channel to a [`DispatchPump`].
#[derive(Clone, Debug)]
pub struct QueueDispatcher {
    tx: Sender<RefreshJob>,
}

/// Receiving end of a [`QueueDispatcher`], drained by the owner thread.
#[derive(Debug)]
pub struct DispatchPump {
    rx: Receiver<RefreshJob>,
}

/// Creates a dispatcher/pump pair holding at most `capacity` queued jobs.
#[must_use]
pub fn dispatch_queue(capacity: usize) -> (QueueDispatcher, DispatchPump) {
    let (tx, rx) = bounded(capacity);
    (QueueDispatcher { tx }, DispatchPump { rx })
}

impl StatsDispatcher for QueueDispatcher {
    fn dispatch(&self, job: RefreshJob) {
        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                warn!("statistics queue full, dropping refresh");
                drop(job);
            }
            Err(TrySendError::Disconnected(job)) => {
                warn!("statistics owner is gone, dropping refresh");
                drop(job);
            }
        }
    }
}

impl DispatchPump {
    /// Runs every job already queued. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        for job in self.rx.try_iter() {
            job.run();
            ran += 1;
        }
        ran
    }

    /// Runs jobs as they arrive until `duration` has elapsed.
    /// Returns how many ran.
    pub fn run_for(&self, duration: Duration) -> usize {
        let deadline = Instant::now() + duration;
        let mut ran = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(job) => {
                    job.run();
                    ran += 1;
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return ran,
            }
        }
    }

    /// Number of jobs waiting.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
