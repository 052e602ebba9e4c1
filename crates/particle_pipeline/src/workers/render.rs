//! Render Loop: redraws on every display tick, consuming a fresh frame
//! when one is ready.
//!
//! The slot is freed only when a fresh frame was claimed. Re-rendering the
//! previous frame never admits another one, which is what bounds the
//! stepper's lead while letting display cadence run independently.

use tracing::{debug, trace};

use super::{LoopScope, Step};
use crate::error::PipelineResult;


pub(crate) fn run(scope: &LoopScope<'_>) -> PipelineResult<()> {
    debug!("render loop started");
    // Lets the stepper publish before this loop has drawn anything.
    scope.shared.handoff.prime();
    scope.finish(render_loop(scope))
}

fn render_loop(scope: &LoopScope<'_>) -> Step {
    let shared = scope.shared;
    while scope.should_continue() {
        scope.wait(shared.display_gate.acquire(scope.token))?;

        let fresh = shared.handoff.try_claim();
        if fresh.is_some() {
            shared.stats.record_fresh_frame();
        }
        if shared.frame_available() {
            scope.call(shared.hooks.render_current_frame())?;
            scope.checkpoint()?;
            shared.stats.record_render();
            trace!(fresh = fresh.is_some(), "frame rendered");
        }
        // Dropping the claim frees the slot for the next frame.
        drop(fresh);
    }
    Ok(())
}
