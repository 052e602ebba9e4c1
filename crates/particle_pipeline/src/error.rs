//! # Pipeline Error Types
//!
//! All failures the scheduler and its loops can report.
//!
//! Nothing here is retried. A failure is either lifecycle misuse reported to
//! the caller, or a fault that stops the pipeline.

use thiserror::Error;

use crate::workers::WorkerKind;

/// Error returned by an external collaborator hook.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HookError(String);

impl HookError {
    /// Creates a hook error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Result type for collaborator hooks.
pub type HookResult = Result<(), HookError>;

/// A loop failed to terminate within the shutdown bound.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShutdownError {
    /// The stepper is still alive, most likely blocked inside simulation code.
    #[error("stepper did not terminate within {timeout_ms} ms (blocked in simulation code?)")]
    Stepper {
        /// The join bound that elapsed.
        timeout_ms: u64,
    },

    /// The render or sampler loop is still alive.
    #[error("{worker} loop did not terminate within {timeout_ms} ms")]
    Worker {
        /// The loop that failed to stop.
        worker: WorkerKind,
        /// The join bound that elapsed.
        timeout_ms: u64,
    },
}

impl ShutdownError {
    /// Builds the timeout failure for `worker`, picking the stepper sub-kind.
    #[must_use]
    pub fn timed_out(worker: WorkerKind, timeout_ms: u64) -> Self {
        match worker {
            WorkerKind::Stepper => Self::Stepper { timeout_ms },
            worker => Self::Worker { worker, timeout_ms },
        }
    }

    /// The loop that failed to stop.
    #[must_use]
    pub fn worker(&self) -> WorkerKind {
        match self {
            Self::Stepper { .. } => WorkerKind::Stepper,
            Self::Worker { worker, .. } => *worker,
        }
    }
}

/// Errors that can occur in the frame pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// `start` was called while the pipeline is running.
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// A control operation was called before the first `start`.
    #[error("pipeline has never been started")]
    NotStarted,

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The OS refused to spawn a loop thread.
    #[error("failed to spawn {worker} thread: {reason}")]
    Spawn {
        /// The thread that could not be spawned.
        worker: WorkerKind,
        /// OS error text.
        reason: String,
    },

    /// The OS refused to spawn the clock's timer thread.
    #[error("failed to spawn clock thread: {0}")]
    ClockSpawn(String),

    /// A loop did not stop in time.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),

    /// A loop was interrupted although no shutdown was requested.
    #[error("{worker} loop interrupted while the pipeline was running")]
    UnexpectedInterrupt {
        /// The interrupted loop.
        worker: WorkerKind,
    },

    /// A collaborator hook returned an error.
    #[error("{worker} hook failed: {reason}")]
    HookFailed {
        /// The loop whose hook failed.
        worker: WorkerKind,
        /// The hook's error message.
        reason: String,
    },

    /// The dispatched statistics refresh failed.
    #[error("statistics refresh failed: {0}")]
    RefreshFailed(String),

    /// The dispatched statistics refresh was discarded without running.
    #[error("statistics refresh was dropped before it ran")]
    RefreshDropped,
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stepper_timeout_is_distinguished() {
        let err = ShutdownError::timed_out(WorkerKind::Stepper, 50);
        assert_eq!(err, ShutdownError::Stepper { timeout_ms: 50 });
        assert_eq!(err.worker(), WorkerKind::Stepper);

        let err = ShutdownError::timed_out(WorkerKind::Render, 50);
        assert_eq!(err, ShutdownError::Worker { worker: WorkerKind::Render, timeout_ms: 50 });
        assert_eq!(err.worker(), WorkerKind::Render);
    }

    #[test]
    fn test_messages_name_the_loop() {
        let err = PipelineError::from(ShutdownError::timed_out(WorkerKind::Sampler, 50));
        assert_eq!(err.to_string(), "sampler loop did not terminate within 50 ms");

        let err = PipelineError::UnexpectedInterrupt { worker: WorkerKind::Render };
        assert!(err.to_string().starts_with("render loop"));

        let err = PipelineError::from(ShutdownError::timed_out(WorkerKind::Stepper, 10));
        assert!(err.to_string().contains("simulation code"));
    }
}
