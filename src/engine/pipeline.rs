//! Blocking cancellation loop.
//!
//! ## Pipeline stages (per iteration)
//!
//! ```text
//! 1. Poll CAPTURE until one near-end frame is buffered; pop exactly one frame
//! 2. Poll PLAYED until one reference frame is buffered; pop exactly one frame
//! 3. EchoCanceller::cancel(near, far) → out
//! 4. Tap (near, far, out) in lock-step frame order, when recording
//! 5. Poll PROCESSED until one frame of space is free; push exactly one frame
//! ```
//!
//! The loop has two states, running and stopping: every poll re-checks the
//! run flag, so a stop request interrupts a stalled wait within one poll
//! interval, and the loop exits without beginning another transform call.
//! A frame is either processed completely or not at all.
//!
//! Frame pairing is enforced by construction: the Nth frame drained from
//! CAPTURE is handed to the canceller together with the Nth frame drained
//! from PLAYED. That guarantees pairing, not wall-clock simultaneity of the
//! underlying physical events.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    buffering::{wait::WaitStrategy, StreamConsumer, StreamProducer},
    canceller::EchoCanceller,
    control::RunState,
    engine::PipelineConfig,
    tap::FrameSink,
};

/// Shared pipeline counters, updated with relaxed atomics from the loop.
#[derive(Default)]
pub struct PipelineDiagnostics {
    pub frames_processed: AtomicUsize,
    pub delay_samples_discarded: AtomicUsize,
    pub capture_polls: AtomicUsize,
    pub played_polls: AtomicUsize,
    pub output_polls: AtomicUsize,
    pub tap_failures: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            delay_samples_discarded: self.delay_samples_discarded.load(Ordering::Relaxed),
            capture_polls: self.capture_polls.load(Ordering::Relaxed),
            played_polls: self.played_polls.load(Ordering::Relaxed),
            output_polls: self.output_polls.load(Ordering::Relaxed),
            tap_failures: self.tap_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DiagnosticsSnapshot {
    pub frames_processed: usize,
    pub delay_samples_discarded: usize,
    pub capture_polls: usize,
    pub played_polls: usize,
    pub output_polls: usize,
    pub tap_failures: usize,
}

/// All context the pipeline needs, passed as one struct so the thread
/// closure stays tidy.
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub canceller: Box<dyn EchoCanceller>,
    /// Raw near-end microphone samples (interleaved).
    pub capture: StreamConsumer,
    /// Mono far-end reference aligned with actual playback.
    pub played: StreamConsumer,
    /// Cancelled near-end output awaiting delivery.
    pub processed: StreamProducer,
    pub run: RunState,
    pub tap: Option<Box<dyn FrameSink>>,
    pub wait: Box<dyn WaitStrategy>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Run the blocking loop until `ctx.run` reports stopping.
pub fn run(mut ctx: PipelineContext) {
    let near_len = ctx.config.near_frame_len();
    let far_len = ctx.config.far_frame_len();
    info!(
        frame_size = ctx.config.frame_size(),
        near_len, far_len, "pipeline started"
    );

    // Scratch frames: allocated once per run, reused every tick.
    let mut near = vec![0i16; near_len];
    let mut far = vec![0i16; far_len];
    let mut out = vec![0i16; near_len];

    if align_capture(&mut ctx) {
        loop {
            if ctx.run.is_stopping() {
                break;
            }

            // ── 1. One near-end frame ────────────────────────────────────
            if !wait_occupied(
                &ctx.capture,
                near_len,
                &ctx.run,
                ctx.wait.as_mut(),
                &ctx.diagnostics.capture_polls,
            ) {
                break;
            }
            let got = ctx.capture.pop_slice(&mut near);
            debug_assert_eq!(got, near_len);

            // ── 2. One reference frame ───────────────────────────────────
            if !wait_occupied(
                &ctx.played,
                far_len,
                &ctx.run,
                ctx.wait.as_mut(),
                &ctx.diagnostics.played_polls,
            ) {
                break;
            }
            let got = ctx.played.pop_slice(&mut far);
            debug_assert_eq!(got, far_len);

            // ── 3. Cancel ────────────────────────────────────────────────
            ctx.canceller.cancel(&near, &far, &mut out);

            // ── 4. Diagnostic recording, lock-step frame order ───────────
            if let Some(mut tap) = ctx.tap.take() {
                match tap.record(&near, &far, &out) {
                    Ok(()) => ctx.tap = Some(tap),
                    Err(e) => {
                        warn!("frame tap failed, recording detached: {e}");
                        ctx.diagnostics.tap_failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }

            // ── 5. Publish ───────────────────────────────────────────────
            // Block-polls symmetrically to the read side when PROCESSED is
            // full; the write below then always completes whole.
            if !wait_vacant(
                &ctx.processed,
                near_len,
                &ctx.run,
                ctx.wait.as_mut(),
                &ctx.diagnostics.output_polls,
            ) {
                // Shutdown arrived while the output ring was full; the
                // cancelled frame is dropped, indices stay intact.
                break;
            }
            let wrote = ctx.processed.push_slice(&out);
            debug_assert_eq!(wrote, near_len);

            ctx.diagnostics
                .frames_processed
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    let snap = ctx.diagnostics.snapshot();
    info!(
        frames_processed = snap.frames_processed,
        delay_samples_discarded = snap.delay_samples_discarded,
        capture_polls = snap.capture_polls,
        played_polls = snap.played_polls,
        output_polls = snap.output_polls,
        tap_failures = snap.tap_failures,
        "pipeline stopped"
    );
}

/// One-time startup alignment: discard the capture samples that predate the
/// first played reference sample.
///
/// Polls until the configured delay has accumulated in CAPTURE, then skips
/// exactly that many samples. A discard target larger than the ring can
/// never be buffered at once, so it is worked off in capacity-sized chunks.
/// Returns false if stop was requested first. A delay of 0 is a no-op.
fn align_capture(ctx: &mut PipelineContext) -> bool {
    let discard = ctx.config.delay_samples * ctx.config.input_channels;
    if discard == 0 {
        return true;
    }

    let capacity = ctx.capture.capacity();
    if discard > capacity {
        warn!(
            discard,
            capacity, "alignment discard exceeds capture ring capacity, skipping in chunks"
        );
    }

    let mut remaining = discard;
    while remaining > 0 {
        let chunk = remaining.min(capacity);
        if !wait_occupied(
            &ctx.capture,
            chunk,
            &ctx.run,
            ctx.wait.as_mut(),
            &ctx.diagnostics.capture_polls,
        ) {
            info!("stop requested during delay alignment");
            return false;
        }

        let skipped = ctx.capture.skip(chunk);
        debug_assert_eq!(skipped, chunk);
        remaining -= skipped;
        ctx.diagnostics
            .delay_samples_discarded
            .fetch_add(skipped, Ordering::Relaxed);
    }

    debug!(
        delay_samples = ctx.config.delay_samples,
        discarded = discard,
        "capture aligned to playback"
    );
    true
}

/// Poll until `needed` samples can be read. Returns false on stop request.
fn wait_occupied(
    consumer: &StreamConsumer,
    needed: usize,
    run: &RunState,
    wait: &mut dyn WaitStrategy,
    polls: &AtomicUsize,
) -> bool {
    loop {
        if run.is_stopping() {
            return false;
        }
        if consumer.occupied_len() >= needed {
            return true;
        }
        polls.fetch_add(1, Ordering::Relaxed);
        wait.pause();
    }
}

/// Poll until `needed` samples can be written. Returns false on stop request.
fn wait_vacant(
    producer: &StreamProducer,
    needed: usize,
    run: &RunState,
    wait: &mut dyn WaitStrategy,
    polls: &AtomicUsize,
) -> bool {
    loop {
        if run.is_stopping() {
            return false;
        }
        if producer.vacant_len() >= needed {
            return true;
        }
        polls.fetch_add(1, Ordering::Relaxed);
        wait.pause();
    }
}
