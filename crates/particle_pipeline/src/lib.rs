//! # Particle Pipeline
//!
//! Frame pipeline scheduler for a real-time particle simulation.
//!
//! Three loops run at their own pace under one clock:
//!
//! ```text
//!                 ┌──────────────── PipelineClock ────────────────┐
//!                 │ every tick: display gate, physics gate (if    │
//!                 │ not paused)                                   │
//!                 └───────┬──────────────────────────┬────────────┘
//!                         │ physics                  │ display
//!                         v                          v
//!   ┌─────────────── Stepper ───────┐   ┌────────── Render ──────────┐
//!   │ lock stats, advance, unlock   │   │ claim fresh frame (if any) │
//!   │ wait slot_free ───────────────┼──>│ render latest frame        │
//!   │ publish, signal frame_ready   │<──┼─ free slot if claimed      │
//!   └───────────────────────────────┘   └────────────────────────────┘
//!                 ^ stats lock
//!                 │
//!   ┌──────── Sampler ──────────────┐
//!   │ every period: lock stats,     │
//!   │ dispatch refresh, wait, unlock│
//!   └───────────────────────────────┘
//! ```
//!
//! The pipeline decides *when* collaborators run and *how* frames are handed
//! off. Physics, drawing and statistics are supplied through
//! [`PipelineHooks`]; the pipeline owns no particle data.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use particle_pipeline::{HookResult, PipelineConfig, PipelineHooks, Scheduler};
//!
//! struct Sim;
//!
//! impl PipelineHooks for Sim {
//!     fn advance_simulation(&self) -> HookResult { Ok(()) }
//!     fn publish_frame(&self) -> HookResult { Ok(()) }
//!     fn render_current_frame(&self) -> HookResult { Ok(()) }
//!     fn refresh_statistics(&self) -> HookResult { Ok(()) }
//! }
//!
//! let scheduler = Scheduler::new(PipelineConfig::manual(), Arc::new(Sim))?;
//! scheduler.start()?;
//! scheduler.clock().tick();
//! scheduler.set_paused(true)?;
//! scheduler.advance_one_frame()?;
//! scheduler.stop(Duration::from_millis(500))?;
//! # Ok::<(), particle_pipeline::PipelineError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handoff;
pub mod hooks;
pub mod scheduler;
pub mod stats;
pub mod stats_lock;
mod workers;

pub use clock::PipelineClock;
pub use config::{ClockMode, PipelineConfig};
pub use dispatch::{dispatch_queue, DispatchPump, InlineDispatcher, QueueDispatcher, RefreshJob, StatsDispatcher};
pub use error::{HookError, HookResult, PipelineError, PipelineResult, ShutdownError};
pub use handoff::{ClaimedFrame, FrameHandoff, SlotPermit};
pub use hooks::PipelineHooks;
pub use scheduler::{Scheduler, SchedulerState};
pub use stats::{PipelineStats, PipelineStatsSnapshot};
pub use stats_lock::{StatsGuard, StatsLock};
pub use workers::WorkerKind;

pub use particle_pipeline_core::{BinarySignal, CancelToken, SignalError};
