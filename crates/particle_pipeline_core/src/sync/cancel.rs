//! Cancellation context for blocking waits.
//!
//! A token is cancelled at most once. Cancellation is observable three ways:
//! - polling [`CancelToken::is_cancelled`]
//! - a timed [`CancelToken::sleep`] that returns early
//! - [`CancelToken::receiver`], which disconnects and so fires in `select!`

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::error::SignalError;

/// Shared cancellation flag with a wake-up channel.
///
/// Cloning is cheap; all clones observe the same cancellation.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    /// Set once, never cleared.
    cancelled: AtomicBool,
    /// Dropped on cancel so that `receiver` disconnects.
    trigger: Mutex<Option<Sender<()>>>,
    /// Never receives a message; only ever disconnects.
    receiver: Receiver<()>,
}

impl CancelToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        let (trigger, receiver) = bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                receiver,
            }),
        }
    }

    /// Cancels the token.
    ///
    /// Returns `true` if this call performed the cancellation, `false` if the
    /// token was already cancelled.
    pub fn cancel(&self) -> bool {
        let was_cancelled = self.inner.cancelled.swap(true, Ordering::SeqCst);
        self.inner.trigger.lock().take();
        !was_cancelled
    }

    /// Returns whether the token has been cancelled.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` unless cancelled first.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Interrupted`] if the token is cancelled before
    /// or during the sleep.
    pub fn sleep(&self, duration: Duration) -> Result<(), SignalError> {
        if self.is_cancelled() {
            return Err(SignalError::Interrupted);
        }
        match self.inner.receiver.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Err(SignalError::Interrupted),
        }
    }

    /// Channel that becomes disconnected when the token is cancelled.
    ///
    /// Intended for `crossbeam_channel::select!` alongside other receivers.
    #[inline]
    #[must_use]
    pub fn receiver(&self) -> &Receiver<()> {
        &self.inner.receiver
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_sleep_elapses() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert_eq!(token.sleep(Duration::from_millis(10)), Ok(()));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_sleep_after_cancel_returns_immediately() {
        let token = CancelToken::new();
        token.cancel();
        let start = Instant::now();
        assert_eq!(token.sleep(Duration::from_secs(10)), Err(SignalError::Interrupted));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_cancel_wakes_sleeper() {
        let token = CancelToken::new();
        let sleeper = token.clone();
        let handle = thread::spawn(move || sleeper.sleep(Duration::from_secs(30)));

        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        token.cancel();

        assert_eq!(handle.join().unwrap(), Err(SignalError::Interrupted));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_receiver_disconnects_on_cancel() {
        let token = CancelToken::new();
        assert!(matches!(
            token.receiver().try_recv(),
            Err(crossbeam_channel::TryRecvError::Empty)
        ));

        token.cancel();
        assert!(matches!(
            token.receiver().try_recv(),
            Err(crossbeam_channel::TryRecvError::Disconnected)
        ));
    }
}
