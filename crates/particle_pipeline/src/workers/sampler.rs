//! Sampler Loop: periodically refreshes derived statistics.
//!
//! The Stats Mutex is held across the dispatched refresh, not just the
//! dispatch call. The [`RefreshJob`] carries the guard, so the lock is
//! released when the job finishes or is discarded; the loop only waits for
//! the job's outcome.

use std::sync::Arc;

use crossbeam_channel::{bounded, select};
use particle_pipeline_core::SignalError;
use tracing::{debug, trace};

use super::{Exit, LoopScope, Step};
use crate::dispatch::RefreshJob;
use crate::error::{PipelineError, PipelineResult};


pub(crate) fn run(scope: &LoopScope<'_>) -> PipelineResult<()> {
    debug!(period = ?scope.shared.sampler_period, "sampler loop started");
    scope.finish(sample_loop(scope))
}

fn sample_loop(scope: &LoopScope<'_>) -> Step {
    while scope.should_continue() {
        scope.wait(scope.token.sleep(scope.shared.sampler_period))?;
        if scope.shared.frame_available() {
            refresh(scope)?;
        }
    }
    Ok(())
}

fn refresh(scope: &LoopScope<'_>) -> Step {
    let shared = scope.shared;
    let guard = scope.wait(shared.stats_lock.lock(scope.token))?;
    let (done_tx, done_rx) = bounded(1);
    shared.dispatcher.dispatch(RefreshJob::new(
        Arc::clone(&shared.hooks),
        guard,
        done_tx,
        Arc::clone(&shared.stats),
    ));

    select! {
        recv(done_rx) -> outcome => match outcome {
            Ok(Ok(())) => {
                trace!("statistics refreshed");
                Ok(())
            }
            Ok(Err(e)) => Err(Exit::Fault(PipelineError::RefreshFailed(e.to_string()))),
            // The job was discarded without running.
            Err(_) if scope.is_live() => Err(Exit::Fault(PipelineError::RefreshDropped)),
            Err(_) => Err(Exit::Shutdown),
        },
        recv(scope.token.receiver()) -> _ => scope.wait(Err(SignalError::Interrupted)),
    }
}
