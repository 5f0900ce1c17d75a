//! Echo-cancellation transform abstraction.
//!
//! The `EchoCanceller` trait decouples the streaming pipeline from any
//! specific adaptation algorithm (speex MDF, WebRTC AEC3, a test double).
//!
//! `cancel` takes `&mut self`: cancellers are stateful, the adaptive filter
//! coefficients evolving across the session. The pipeline thread owns the
//! box, so the transform runs exactly once per frame, in strict temporal
//! order, never concurrently.

pub mod passthrough;

pub use passthrough::PassthroughCanceller;

use serde::{Deserialize, Serialize};

/// Reference (far-end) channel count. The pipeline plays a mono reference;
/// multi-channel playback is not supported.
pub const REFERENCE_CHANNELS: usize = 1;

/// Geometry an echo-canceller session is constructed with, fixed for the
/// lifetime of the session.
///
/// Derived from [`PipelineConfig::canceller_params`]; implementations must
/// reject unsupported combinations at construction, never per frame.
///
/// [`PipelineConfig::canceller_params`]: crate::engine::PipelineConfig::canceller_params
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellerParams {
    /// Samples per channel per 10 ms tick.
    pub frame_size: usize,
    /// Adaptive filter length in samples.
    pub filter_length: usize,
    /// Near-end interleaved channel count.
    pub input_channels: usize,
    /// Far-end reference channel count (always [`REFERENCE_CHANNELS`]).
    pub reference_channels: usize,
    /// Session sample rate in Hz.
    pub sample_rate: u32,
}

/// Contract for echo-cancellation backends.
///
/// Frames are interleaved signed 16-bit samples: `near` and `out` carry
/// `frame_size * input_channels` samples, `far` carries
/// `frame_size * reference_channels` samples. Given valid fixed-size inputs
/// the per-frame call is infallible; configuration problems surface at
/// construction time.
pub trait EchoCanceller: Send + 'static {
    /// Estimate the near-end signal with the echo component removed.
    ///
    /// `near` is the microphone capture, `far` the reference that was
    /// actually played; the cancelled result is written to `out`.
    fn cancel(&mut self, near: &[i16], far: &[i16], out: &mut [i16]);
}
