//! # Frame Handoff
//!
//! Single-slot producer/consumer channel between the stepper and the
//! renderer, built from two binary signals.
//!
//! ```text
//!   Stepper                                  Renderer
//!   ───────                                  ────────
//!   wait_for_slot() ──acquire── [slot_free] <──release── drop(ClaimedFrame)
//!   publish_frame()
//!   deposit()       ──release── [frame_ready] ──try_acquire──> try_claim()
//! ```
//!
//! ## Ordering
//!
//! - `frame_ready` is released only after the frame is fully published.
//! - `slot_free` is released only after the renderer is done with the frame.
//!
//! At most one frame is ever in flight: the stepper cannot start a second
//! deposit until the renderer frees the slot.
//!
//! Permits and claims belong to the run they were taken in. After
//! [`FrameHandoff::reset`], dropping or depositing one from an earlier run
//! releases nothing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use particle_pipeline_core::{BinarySignal, CancelToken, SignalError};

#[derive(Debug, Default)]
struct HandoffCounters {
    deposited: AtomicU64,
    claimed: AtomicU64,
    generation: AtomicU64,
}

/// The slot-free / frame-ready signal pair.
#[derive(Clone, Debug)]
pub struct FrameHandoff {
    slot_free: BinarySignal,
    frame_ready: BinarySignal,
    counters: Arc<HandoffCounters>,
}

impl FrameHandoff {
    /// Creates a handoff with the slot free and no frame ready.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot_free: BinarySignal::new("slot_free", true),
            frame_ready: BinarySignal::new("frame_ready", false),
            counters: Arc::new(HandoffCounters::default()),
        }
    }

    /// Drops stale permits left by a previous run and zeroes the counters.
    ///
    /// The slot stays closed until the renderer calls [`FrameHandoff::prime`].
    pub fn reset(&self) {
        self.counters.generation.fetch_add(1, Ordering::SeqCst);
        self.slot_free.drain();
        self.frame_ready.drain();
        self.counters.deposited.store(0, Ordering::SeqCst);
        self.counters.claimed.store(0, Ordering::SeqCst);
    }

    /// Opens the slot for the first frame of a run.
    pub fn prime(&self) {
        self.slot_free.release();
    }

    /// Blocks until the renderer has freed the slot.
    ///
    /// This is the backpressure point: the stepper can be at most one frame
    /// ahead of the renderer.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Interrupted`] if `cancel` fires first.
    pub fn wait_for_slot(&self, cancel: &CancelToken) -> Result<SlotPermit, SignalError> {
        self.slot_free.acquire(cancel)?;
        Ok(SlotPermit {
            handoff: self.clone(),
            issued: self.generation(),
            deposited: false,
        })
    }

    /// Claims a deposited frame if one is ready. Never blocks.
    #[must_use]
    pub fn try_claim(&self) -> Option<ClaimedFrame> {
        if self.frame_ready.try_acquire() {
            self.counters.claimed.fetch_add(1, Ordering::SeqCst);
            Some(ClaimedFrame {
                handoff: self.clone(),
                issued: self.generation(),
            })
        } else {
            None
        }
    }

    /// Frames deposited but not yet claimed. Never exceeds one.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        let claimed = self.counters.claimed.load(Ordering::SeqCst);
        let deposited = self.counters.deposited.load(Ordering::SeqCst);
        deposited.saturating_sub(claimed)
    }

    /// Frames deposited since the last reset.
    #[must_use]
    pub fn deposited(&self) -> u64 {
        self.counters.deposited.load(Ordering::SeqCst)
    }

    /// Frames claimed since the last reset.
    #[must_use]
    pub fn claimed(&self) -> u64 {
        self.counters.claimed.load(Ordering::SeqCst)
    }

    pub(crate) fn slot_free(&self) -> &BinarySignal {
        &self.slot_free
    }

    fn generation(&self) -> u64 {
        self.counters.generation.load(Ordering::SeqCst)
    }
}

impl Default for FrameHandoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Ownership of the free slot, held by the stepper while it publishes.
///
/// Dropping the permit without depositing hands the slot back.
#[must_use = "dropping the permit gives the slot back without a frame"]
#[derive(Debug)]
pub struct SlotPermit {
    handoff: FrameHandoff,
    issued: u64,
    deposited: bool,
}

impl SlotPermit {
    /// Marks the published frame ready for the renderer.
    pub fn deposit(mut self) {
        self.deposited = true;
        if self.is_stale() {
            return;
        }
        self.handoff.counters.deposited.fetch_add(1, Ordering::SeqCst);
        self.handoff.frame_ready.release();
    }

    /// Whether the handoff has been reset since this permit was taken.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.handoff.generation() != self.issued
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        if !self.deposited && !self.is_stale() {
            self.handoff.slot_free.release();
        }
    }
}

/// A frame the renderer has claimed.
///
/// The slot is freed for the next frame when this is dropped, i.e. after
/// the renderer has finished reading.
#[must_use = "dropping the claim frees the slot immediately"]
#[derive(Debug)]
pub struct ClaimedFrame {
    handoff: FrameHandoff,
    issued: u64,
}

impl Drop for ClaimedFrame {
    fn drop(&mut self) {
        if self.handoff.generation() == self.issued {
            self.handoff.slot_free.release();
        }
    }
}
