//! # Signal Error Types

use thiserror::Error;

/// Failure of a blocking wait on a signalling primitive.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalError {
    /// The waiter's cancel token fired before a permit became available.
    #[error("wait interrupted by cancellation")]
    Interrupted,
}
