//! # Binary Signal Benchmark
//!
//! Measures the signalling cost the pipeline pays on every frame:
//! 1. Uncontended release + acquire (rate gate fast path)
//! 2. Release on an already-present permit (idempotent no-op)
//! 3. Cross-thread ping-pong (frame handoff round trip)

#![allow(missing_docs)]

use std::thread;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use particle_pipeline_core::{BinarySignal, CancelToken};

fn bench_uncontended(c: &mut Criterion) {
    let signal = BinarySignal::new("bench", false);
    let token = CancelToken::new();

    c.bench_function("release_acquire_uncontended", |b| {
        b.iter(|| {
            signal.release();
            black_box(signal.acquire(&token)).ok();
        });
    });

    c.bench_function("release_when_present", |b| {
        signal.release();
        b.iter(|| black_box(signal.release()));
    });
}

fn bench_ping_pong(c: &mut Criterion) {
    let slot_free = BinarySignal::new("slot_free", true);
    let frame_ready = BinarySignal::new("frame_ready", false);
    let token = CancelToken::new();

    let consumer = {
        let (slot_free, frame_ready, token) = (slot_free.clone(), frame_ready.clone(), token.clone());
        thread::spawn(move || {
            while frame_ready.acquire(&token).is_ok() {
                slot_free.release();
            }
        })
    };

    c.bench_function("handoff_round_trip", |b| {
        b.iter(|| {
            slot_free.acquire(&token).ok();
            frame_ready.release();
        });
    });

    token.cancel();
    frame_ready.wake_waiters();
    consumer.join().ok();
}

criterion_group!(benches, bench_uncontended, bench_ping_pong);
criterion_main!(benches);
