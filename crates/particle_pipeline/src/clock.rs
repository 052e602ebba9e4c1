//! # Pipeline Clock
//!
//! Fixed-interval ticker that paces the stepper and the renderer.
//!
//! ## Design
//!
//! Each tick is pure signal fan-out:
//! - release the display gate, always
//! - release the physics gate, unless paused
//!
//! The clock never touches simulation state. Because gates hold at most one
//! permit, a loop that falls behind skips ticks instead of bursting.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use particle_pipeline_core::{BinarySignal, CancelToken};
use tracing::{debug, trace};

use crate::stats::PipelineStats;

/// Handle that releases the rate gates.
///
/// Cloning is cheap; clones drive the same gates. With
/// [`ClockMode::Manual`](crate::ClockMode::Manual) this handle is the only
/// tick source.
#[derive(Clone, Debug)]
pub struct PipelineClock {
    physics_gate: BinarySignal,
    display_gate: BinarySignal,
    paused: Arc<AtomicBool>,
    /// Serializes a tick's pause check with pause changes.
    tick_lock: Arc<Mutex<()>>,
    stats: Arc<PipelineStats>,
}

impl PipelineClock {
    pub(crate) fn new(
        physics_gate: BinarySignal,
        display_gate: BinarySignal,
        paused: Arc<AtomicBool>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            physics_gate,
            display_gate,
            paused,
            tick_lock: Arc::new(Mutex::new(())),
            stats,
        }
    }

    /// Fires one tick.
    pub fn tick(&self) {
        let _tick = self.tick_lock.lock();
        self.stats.record_tick();
        self.display_gate.release();
        if !self.paused.load(Ordering::SeqCst) {
            self.physics_gate.release();
            self.stats.record_physics_release();
        }
        trace!("clock tick");
    }

    /// Returns whether physics ticks are currently withheld.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Sets the pause flag.
    ///
    /// Pausing also drains the physics gate, so a tick that fired just
    /// before the pause cannot let one more step through.
    pub(crate) fn set_paused(&self, paused: bool) {
        let _tick = self.tick_lock.lock();
        self.paused.store(paused, Ordering::SeqCst);
        if paused {
            self.physics_gate.drain();
        }
    }

    /// Releases the physics gate once, regardless of pause.
    pub(crate) fn step_once(&self) {
        self.physics_gate.release();
        self.stats.record_physics_release();
    }

    /// Starts a timer thread ticking every `interval` until `token` fires.
    ///
    /// Ticks are scheduled against fixed deadlines; a late tick does not
    /// shift the ones after it, and missed deadlines are skipped rather than
    /// replayed.
    pub(crate) fn spawn(&self, interval: Duration, token: CancelToken) -> io::Result<ClockThread> {
        let clock = self.clone();
        let thread_token = token.clone();
        let thread = thread::Builder::new()
            .name("pipeline-clock".to_string())
            .spawn(move || clock.run(interval, &thread_token))?;
        Ok(ClockThread { token, thread })
    }

    fn run(&self, interval: Duration, token: &CancelToken) {
        debug!(?interval, "clock started");
        let mut next = Instant::now() + interval;
        loop {
            let wait = next.saturating_duration_since(Instant::now());
            if token.sleep(wait).is_err() {
                break;
            }
            self.tick();

            next += interval;
            let now = Instant::now();
            if next < now {
                next = now + interval;
            }
        }
        debug!("clock stopped");
    }
}

/// Running timer thread.
#[derive(Debug)]
pub(crate) struct ClockThread {
    token: CancelToken,
    thread: JoinHandle<()>,
}

impl ClockThread {
    /// Cancels the timer and waits for it; the timer only ever sleeps.
    pub(crate) fn stop(self) {
        self.token.cancel();
        if self.thread.join().is_err() {
            debug!("clock thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> PipelineClock {
        PipelineClock::new(
            BinarySignal::new("physics", false),
            BinarySignal::new("display", false),
            Arc::new(AtomicBool::new(false)),
            Arc::new(PipelineStats::new()),
        )
    }

    #[test]
    fn test_tick_releases_both_gates() {
        let clock = clock();
        clock.tick();
        assert!(clock.display_gate.try_acquire());
        assert!(clock.physics_gate.try_acquire());
    }

    #[test]
    fn test_each_tick_releases_display_once() {
        let clock = clock();
        for _ in 0..10 {
            clock.tick();
            assert!(clock.display_gate.try_acquire());
            assert!(!clock.display_gate.try_acquire());
        }
        assert_eq!(clock.stats.snapshot().ticks, 10);
    }

    #[test]
    fn test_paused_tick_withholds_physics() {
        let clock = clock();
        clock.set_paused(true);
        for _ in 0..5 {
            clock.tick();
            assert!(clock.display_gate.try_acquire());
            assert!(!clock.physics_gate.try_acquire());
        }

        clock.set_paused(false);
        clock.tick();
        assert!(clock.physics_gate.try_acquire());

        let snap = clock.stats.snapshot();
        assert_eq!(snap.ticks, 6);
        assert_eq!(snap.physics_releases, 1);
    }

    #[test]
    fn test_pause_drains_pending_physics_tick() {
        let clock = clock();
        clock.tick();
        clock.set_paused(true);
        assert!(!clock.physics_gate.try_acquire());
        assert!(clock.is_paused());
    }

    #[test]
    fn test_step_once_ignores_pause() {
        let clock = clock();
        clock.set_paused(true);
        clock.step_once();
        assert!(clock.physics_gate.try_acquire());
    }

    #[test]
    fn test_timer_thread_ticks_until_stopped() {
        let clock = clock();
        let timer = clock.spawn(Duration::from_millis(2), CancelToken::new()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while clock.stats.snapshot().ticks < 3 {
            assert!(Instant::now() < deadline, "clock never ticked");
            thread::sleep(Duration::from_millis(1));
        }
        timer.stop();

        let after_stop = clock.stats.snapshot().ticks;
        thread::sleep(Duration::from_millis(20));
        assert_eq!(clock.stats.snapshot().ticks, after_stop);
    }
}
