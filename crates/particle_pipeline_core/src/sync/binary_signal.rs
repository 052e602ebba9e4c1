//! # Binary Signal
//!
//! A semaphore that holds at most one permit.
//!
//! ## State
//!
//! ```text
//!          release()                 acquire() / try_acquire()
//!   ┌────────────┐ ─────────────> ┌────────────┐ ─────────────> ┌────────────┐
//!   │  ABSENT    │                │  PRESENT   │                │  ABSENT    │
//!   └────────────┘ <───────────── └────────────┘                └────────────┘
//!                      drain()
//! ```
//!
//! - `release()` on PRESENT is a no-op: permits never accumulate.
//! - Waiters queue by ticket and are served in arrival order.
//! - A waiter whose cancel token fires leaves the queue without a permit.
//!
//! Release, drain and wake may be called from any thread.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::cancel::CancelToken;
use crate::error::SignalError;

/// Mutable state guarded by the signal's mutex.
#[derive(Debug, Default)]
struct SignalState {
    /// Whether the single permit is present.
    permit: bool,
    /// Tickets of blocked waiters, oldest first.
    waiters: VecDeque<u64>,
    /// Next ticket to hand out.
    next_ticket: u64,
}

struct SignalInner {
    name: &'static str,
    state: Mutex<SignalState>,
    condvar: Condvar,
}

/// Permit-of-one signal with fair, cancellable waits.
///
/// Cloning is cheap; all clones refer to the same permit.
///
/// ## Usage
///
/// ```rust
/// use particle_pipeline_core::{BinarySignal, CancelToken};
///
/// let slot_free = BinarySignal::new("slot_free", true);
/// let token = CancelToken::new();
///
/// slot_free.acquire(&token).unwrap();
/// assert!(!slot_free.is_available());
/// slot_free.release();
/// assert!(slot_free.drain());
/// ```
#[derive(Clone)]
pub struct BinarySignal {
    inner: Arc<SignalInner>,
}

impl BinarySignal {
    /// Creates a signal, with its permit present if `available` is true.
    #[must_use]
    pub fn new(name: &'static str, available: bool) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                name,
                state: Mutex::new(SignalState {
                    permit: available,
                    ..SignalState::default()
                }),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Name used in logs and diagnostics.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Blocks until the permit is available, then consumes it.
    ///
    /// Waiters are served in the order they arrived.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Interrupted`] if `cancel` is (or becomes)
    /// cancelled before the permit is obtained. A waiter blocked when the
    /// token fires is only woken once [`BinarySignal::wake_waiters`] is
    /// called.
    pub fn acquire(&self, cancel: &CancelToken) -> Result<(), SignalError> {
        let mut state = self.inner.state.lock();

        if cancel.is_cancelled() {
            return Err(SignalError::Interrupted);
        }
        if state.permit && state.waiters.is_empty() {
            state.permit = false;
            return Ok(());
        }

        let ticket = state.next_ticket;
        state.next_ticket = state.next_ticket.wrapping_add(1);
        state.waiters.push_back(ticket);

        loop {
            if cancel.is_cancelled() {
                state.waiters.retain(|&t| t != ticket);
                // Whoever is now at the head may be able to take the permit.
                self.inner.condvar.notify_all();
                return Err(SignalError::Interrupted);
            }
            if state.permit && state.waiters.front() == Some(&ticket) {
                state.waiters.pop_front();
                state.permit = false;
                return Ok(());
            }
            self.inner.condvar.wait(&mut state);
        }
    }

    /// Consumes the permit if it is present and nobody is queued for it.
    ///
    /// Never blocks.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.permit && state.waiters.is_empty() {
            state.permit = false;
            true
        } else {
            false
        }
    }

    /// Makes the permit available.
    ///
    /// Returns `false` (and changes nothing) if the permit was already
    /// present.
    pub fn release(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.permit {
            return false;
        }
        state.permit = true;
        self.inner.condvar.notify_all();
        true
    }

    /// Removes any outstanding permit, reporting whether one was present.
    pub fn drain(&self) -> bool {
        std::mem::replace(&mut self.inner.state.lock().permit, false)
    }

    /// Wakes every blocked waiter so it re-checks its cancel token.
    ///
    /// Call after cancelling a token whose holder may be parked here.
    pub fn wake_waiters(&self) {
        let _state = self.inner.state.lock();
        self.inner.condvar.notify_all();
    }

    /// Returns whether the permit is currently present.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.inner.state.lock().permit
    }

    /// Number of threads currently blocked in [`BinarySignal::acquire`].
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }
}

impl fmt::Debug for BinarySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("BinarySignal")
            .field("name", &self.inner.name)
            .field("permit", &state.permit)
            .field("waiting", &state.waiters.len())
            .finish()
    }
}
