//! Hardware audio engine seam.
//!
//! The physical device path is an external collaborator: it drains the
//! PLAYBACK ring into the speaker and produces the CAPTURE (raw microphone)
//! and PLAYED (reference actually delivered to the DAC) rings. The pipeline
//! only ever sees the consumer halves returned from [`AudioBackend::start`];
//! the backend chooses its own ring capacities.
//!
//! # Threading note
//!
//! Device streams are thread-bound on most platforms (`cpal::Stream` is
//! `!Send`: COM on Windows, CoreAudio on macOS). The engine therefore calls
//! `start` on the pipeline thread and drops the returned [`AudioGuard`]
//! on that same thread after the loop exits. The guard is deliberately not
//! required to be `Send`.

#[cfg(feature = "audio-cpal")]
pub mod cpal_backend;

#[cfg(feature = "audio-cpal")]
pub use cpal_backend::CpalBackend;

use crate::buffering::StreamConsumer;
use crate::control::RunState;
use crate::error::Result;

/// Fixed parameters the engine hands to the backend at startup.
#[derive(Debug, Clone, Copy)]
pub struct AudioParams {
    /// Sample rate in Hz for both playback and capture.
    pub sample_rate: u32,
    /// Interleaved channel count produced into CAPTURE.
    pub input_channels: usize,
}

/// Keeps the device session alive. Stopped and dropped on the pipeline
/// thread once the cancellation loop has exited.
pub trait AudioGuard {
    fn stop(&mut self);
}

/// A started device session: the two input streams the cancellation loop
/// consumes, plus the guard holding the underlying device resources.
pub struct StartedAudio {
    /// Raw near-end microphone samples, `input_channels` interleaved.
    pub capture: StreamConsumer,
    /// Mono far-end reference, aligned with what was actually played.
    pub played: StreamConsumer,
    pub guard: Box<dyn AudioGuard>,
}

/// Contract for hardware audio engines.
///
/// Implementations must not block inside device callbacks and must write
/// CAPTURE and PLAYED from exactly one thread each (the rings are SPSC).
/// When a ring is full the excess is dropped, never queued.
pub trait AudioBackend: Send + 'static {
    /// Open the device path and start streaming.
    ///
    /// Called on the pipeline thread. `playback` is the far-end audio
    /// awaiting playback; `run` lets callbacks go quiet once shutdown has
    /// been requested.
    ///
    /// # Errors
    /// Any device/stream failure here is fatal: the engine reports it to the
    /// `start()` caller and never enters the loop.
    fn start(
        &mut self,
        playback: StreamConsumer,
        run: RunState,
        params: &AudioParams,
    ) -> Result<StartedAudio>;
}
