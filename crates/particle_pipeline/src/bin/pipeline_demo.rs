//! # Pipeline Demo
//!
//! Headless driver for the frame pipeline with a toy particle box.
//!
//! ```bash
//! # Reference timings
//! cargo run --features demo --bin pipeline_demo
//!
//! # Timings from a file, with debug logs
//! RUST_LOG=particle_pipeline=debug cargo run --features demo --bin pipeline_demo -- pipeline.toml
//! ```
//!
//! Statistics are refreshed on the main thread through a dispatch queue,
//! the way a UI thread would own them.

use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use particle_pipeline::{dispatch_queue, HookError, HookResult, PipelineConfig, PipelineHooks, PipelineResult, Scheduler};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const PARTICLES: usize = 64;
const BOX_SIZE: f32 = 100.0;
const DT: f32 = 0.037;

#[derive(Clone, Copy, Debug, Default)]
struct Particle {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
}

/// A box of particles bouncing off the walls.
struct ParticleBox {
    /// Simulation state, touched only by `advance_simulation`.
    live: Mutex<Vec<Particle>>,
    /// Last published copy, read by the renderer.
    published: Mutex<Vec<Particle>>,
    frames_drawn: AtomicU64,
}

impl ParticleBox {
    fn new() -> Self {
        let particles = (0..PARTICLES)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f32;
                Particle {
                    x: (t * 7.3) % BOX_SIZE,
                    y: (t * 13.1) % BOX_SIZE,
                    vx: 20.0 - (t * 3.7) % 40.0,
                    vy: 15.0 - (t * 5.9) % 30.0,
                }
            })
            .collect();
        Self {
            live: Mutex::new(particles),
            published: Mutex::new(Vec::with_capacity(PARTICLES)),
            frames_drawn: AtomicU64::new(0),
        }
    }
}

fn bounce(position: &mut f32, velocity: &mut f32) {
    *position += *velocity * DT;
    if *position < 0.0 || *position > BOX_SIZE {
        *velocity = -*velocity;
        *position = position.clamp(0.0, BOX_SIZE);
    }
}

impl PipelineHooks for ParticleBox {
    fn advance_simulation(&self) -> HookResult {
        for p in self.live.lock().iter_mut() {
            bounce(&mut p.x, &mut p.vx);
            bounce(&mut p.y, &mut p.vy);
        }
        Ok(())
    }

    fn publish_frame(&self) -> HookResult {
        let live = self.live.lock();
        let mut published = self.published.lock();
        published.clear();
        published.extend_from_slice(&live);
        Ok(())
    }

    fn render_current_frame(&self) -> HookResult {
        if self.published.lock().is_empty() {
            return Err(HookError::new("no frame published"));
        }
        self.frames_drawn.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn refresh_statistics(&self) -> HookResult {
        let live = self.live.lock();
        #[allow(clippy::cast_precision_loss)]
        let mean_speed = live.iter().map(|p| p.vx.hypot(p.vy)).sum::<f32>() / live.len() as f32;
        info!(
            mean_speed,
            frames_drawn = self.frames_drawn.load(Ordering::Relaxed),
            "statistics"
        );
        Ok(())
    }
}

fn load_config() -> PipelineResult<PipelineConfig> {
    match std::env::args().nth(1) {
        Some(path) => PipelineConfig::load(path),
        None => Ok(PipelineConfig::reference()),
    }
}

fn run() -> PipelineResult<()> {
    let config = load_config()?;
    let stop_timeout = config.shutdown_timeout();
    let sim = Arc::new(ParticleBox::new());
    let (dispatcher, pump) = dispatch_queue(1);
    let scheduler = Scheduler::with_dispatcher(config, Arc::clone(&sim), dispatcher)?;

    scheduler.start()?;
    pump.run_for(Duration::from_millis(2500));

    scheduler.set_paused(true)?;
    pump.run_for(Duration::from_millis(500));
    for _ in 0..3 {
        scheduler.advance_one_frame()?;
        pump.run_for(Duration::from_millis(100));
    }
    scheduler.set_paused(false)?;
    pump.run_for(Duration::from_millis(1500));

    scheduler.stop(stop_timeout)?;
    // A refresh queued when the sampler was interrupted still holds its lock.
    pump.run_pending();

    let stats = scheduler.stats();
    info!(
        ticks = stats.ticks,
        steps = stats.steps,
        renders = stats.renders,
        repeated = stats.repeated_renders(),
        refreshes = stats.refreshes,
        "run complete"
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "pipeline demo failed");
            ExitCode::FAILURE
        }
    }
}
