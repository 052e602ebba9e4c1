//! # Collaborator Hooks
//!
//! The pipeline decides *when* collaborators run; the collaborators decide
//! *what* happens. Physics, drawing and statistics live outside this crate
//! and plug in through [`PipelineHooks`].
//!
//! ```text
//! Pipeline calls:            Collaborator implements:
//! ┌────────────────────┐     ┌─────────────────────────┐
//! │ Stepper Loop       │ ──> │ advance_simulation      │ (Stats Mutex held)
//! │                    │ ──> │ publish_frame           │
//! │ Render Loop        │ ──> │ render_current_frame    │
//! │ Sampler Loop       │ ──> │ refresh_statistics      │ (dispatched)
//! └────────────────────┘     └─────────────────────────┘
//! ```

use crate::error::HookResult;

/// Operations owned by the simulation, renderer and statistics display.
///
/// Every method is called from a pipeline thread, never concurrently with
/// itself. `advance_simulation` and `refresh_statistics` are never called
/// concurrently with each other.
pub trait PipelineHooks: Send + Sync + 'static {
    /// Advances shared simulation state by one step.
    ///
    /// May block or take variable time. Only runs while the Stats Mutex is
    /// held.
    ///
    /// # Errors
    ///
    /// An error is fatal to the pipeline.
    fn advance_simulation(&self) -> HookResult;

    /// Hands the just-computed frame to the rendering collaborator.
    ///
    /// Called after the Stats Mutex is released and the handoff slot is
    /// free, before the renderer is told a frame is ready.
    ///
    /// # Errors
    ///
    /// An error is fatal to the pipeline.
    fn publish_frame(&self) -> HookResult;

    /// Redraws whatever frame is currently published.
    ///
    /// Must be idempotent: it is called again with no new frame whenever the
    /// simulation is paused or slower than the display.
    ///
    /// # Errors
    ///
    /// An error is fatal to the pipeline.
    fn render_current_frame(&self) -> HookResult;

    /// Recomputes and redisplays derived statistics.
    ///
    /// Runs on whatever context the configured dispatcher hands it to.
    ///
    /// # Errors
    ///
    /// An error is fatal to the pipeline.
    fn refresh_statistics(&self) -> HookResult;
}
