//! # Stats Mutex
//!
//! A binary signal used as a non-reentrant lock between the stepper (which
//! mutates simulation state) and the sampler (which reads it for
//! statistics).
//!
//! The guard is an owned value so it can travel with a dispatched refresh
//! job to another thread; the lock is released wherever the guard is
//! dropped.
//!
//! Guards are tied to the run they were taken in. A refresh job that
//! outlives its run (still queued when the pipeline stopped) unlocks
//! nothing once [`StatsLock::reset`] has armed the lock for a new run, and
//! the job is discarded instead of refreshing without the lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use particle_pipeline_core::{BinarySignal, CancelToken, SignalError};

/// Lock serializing simulation steps with statistics refreshes.
#[derive(Clone, Debug)]
pub struct StatsLock {
    signal: BinarySignal,
    generation: Arc<AtomicU64>,
}

impl StatsLock {
    /// Creates an unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            signal: BinarySignal::new("stats_mutex", true),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Blocks until the lock is free, then takes it.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Interrupted`] if `cancel` fires first.
    pub fn lock(&self, cancel: &CancelToken) -> Result<StatsGuard, SignalError> {
        self.signal.acquire(cancel)?;
        Ok(self.guard())
    }

    /// Takes the lock if it is free. Never blocks.
    #[must_use]
    pub fn try_lock(&self) -> Option<StatsGuard> {
        self.signal.try_acquire().then(|| self.guard())
    }

    /// Returns whether some guard currently holds the lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        !self.signal.is_available()
    }

    /// Forces the lock back to unlocked for a fresh run.
    ///
    /// Guards taken before the reset no longer unlock when dropped.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.signal.drain();
        self.signal.release();
    }

    fn guard(&self) -> StatsGuard {
        StatsGuard {
            signal: self.signal.clone(),
            generation: Arc::clone(&self.generation),
            issued: self.generation.load(Ordering::SeqCst),
        }
    }

    pub(crate) fn signal(&self) -> &BinarySignal {
        &self.signal
    }
}

impl Default for StatsLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of holding the [`StatsLock`]; unlocks on drop.
#[must_use = "dropping the guard unlocks immediately"]
#[derive(Debug)]
pub struct StatsGuard {
    signal: BinarySignal,
    generation: Arc<AtomicU64>,
    issued: u64,
}

impl StatsGuard {
    /// Whether the lock has been reset since this guard was taken. A stale
    /// guard no longer excludes anything.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.generation.load(Ordering::SeqCst) != self.issued
    }
}

impl Drop for StatsGuard {
    fn drop(&mut self) {
        if !self.is_stale() {
            self.signal.release();
        }
    }
}
