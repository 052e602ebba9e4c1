//! # Pipeline Statistics
//!
//! Lock-free counters bumped by the clock and the loops, read as a
//! snapshot from any thread. Reset at every start.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every pipeline thread.
#[derive(Debug, Default)]
pub struct PipelineStats {
    ticks: AtomicU64,
    physics_releases: AtomicU64,
    steps: AtomicU64,
    frames_published: AtomicU64,
    fresh_frames: AtomicU64,
    renders: AtomicU64,
    refreshes: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStatsSnapshot {
    /// Clock ticks, including the priming tick at start.
    pub ticks: u64,
    /// Releases of the physics gate by the clock or single-stepping.
    pub physics_releases: u64,
    /// Completed `advance_simulation` calls.
    pub steps: u64,
    /// Completed `publish_frame` calls, including the initial frame.
    pub frames_published: u64,
    /// Frames the renderer claimed through the handoff.
    pub fresh_frames: u64,
    /// Completed `render_current_frame` calls.
    pub renders: u64,
    /// Completed statistics refreshes.
    pub refreshes: u64,
}

impl PipelineStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_physics_release(&self) {
        self.physics_releases.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_step(&self) {
        self.steps.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_publish(&self) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_fresh_frame(&self) {
        self.fresh_frames.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_render(&self) {
        self.renders.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        for counter in [
            &self.ticks,
            &self.physics_releases,
            &self.steps,
            &self.frames_published,
            &self.fresh_frames,
            &self.renders,
            &self.refreshes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Copies the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            physics_releases: self.physics_releases.load(Ordering::Relaxed),
            steps: self.steps.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            fresh_frames: self.fresh_frames.load(Ordering::Relaxed),
            renders: self.renders.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
        }
    }
}

impl PipelineStatsSnapshot {
    /// Renders that repeated an already-drawn frame.
    #[must_use]
    pub fn repeated_renders(&self) -> u64 {
        self.renders.saturating_sub(self.fresh_frames)
    }
}
