//! # Synchronization Primitives for the Frame Pipeline
//!
//! ## The Problem
//!
//! ```text
//! Stepper thread:  ADVANCE state, PUBLISH frame
//! Render thread:   DRAW latest frame
//! Sampler thread:  READ state for statistics
//!
//! Unpaced:          stepper races ahead, renderer reads half-written frames
//! Blocking forever: shutdown hangs on a parked thread
//! ```
//!
//! ## The Solution: Binary Signals + Cancel Tokens
//!
//! ```text
//! release() ──> [ permit: 0 | 1 ] ──> acquire(&token)
//!                                        │
//!                  token.cancel() ───────┘ (wakes with Interrupted)
//! ```
//!
//! A signal never holds more than one permit, so repeated releases cannot
//! let a consumer run twice for one event.

mod binary_signal;
mod cancel;

pub use binary_signal::BinarySignal;
pub use cancel::CancelToken;
