//! # Particle Pipeline Core
//!
//! Counting/binary signalling primitives shared by the frame pipeline:
//! - [`BinarySignal`]: holds at most one permit, serves waiters in FIFO order
//! - [`CancelToken`]: cooperative cancellation observed by every blocking wait
//!
//! ## Example
//!
//! ```rust
//! use particle_pipeline_core::{BinarySignal, CancelToken};
//!
//! let gate = BinarySignal::new("physics", false);
//! let token = CancelToken::new();
//!
//! gate.release();
//! gate.release(); // no-op, still a single permit
//! assert!(gate.acquire(&token).is_ok());
//! assert!(!gate.try_acquire());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod sync;

pub use error::SignalError;
pub use sync::{BinarySignal, CancelToken};
