//! # aec-engine
//!
//! Real-time acoustic-echo-cancellation streaming pipeline.
//!
//! ## Architecture
//!
//! ```text
//! ingress ──► PLAYBACK ──► [audio backend] ──► PLAYED ─┐
//!                                └──► CAPTURE ─────────┤
//!                                                      ▼
//!                                      cancellation loop (10 ms frames)
//!                                                      │
//!                                                 PROCESSED ──► egress
//! ```
//!
//! Four bounded SPSC ring buffers connect stages running at independent
//! rates. The cancellation loop pairs the Nth captured frame with the Nth
//! played reference frame, feeds both to an [`EchoCanceller`], and publishes
//! the result, waiting by cooperative polling only under a cancellable
//! [`RunState`] observed at every poll. A configured startup delay is
//! discarded from CAPTURE once, compensating for the fixed latency between
//! writing to PLAYBACK and observing the echo in CAPTURE.
//!
//! The adaptive filter itself, the transport feeding PLAYBACK/draining
//! PROCESSED, and the process surface (signals, CLI) are external
//! collaborators behind the [`EchoCanceller`], [`StreamIo`] and
//! [`AudioBackend`] seams.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod canceller;
pub mod control;
pub mod engine;
pub mod error;
pub mod tap;

// Convenience re-exports for downstream crates
pub use audio::{AudioBackend, AudioGuard, AudioParams, StartedAudio};
pub use canceller::{CancellerParams, EchoCanceller, PassthroughCanceller};
pub use control::RunState;
pub use engine::{AecEngine, EngineStatus, PipelineConfig, StreamIo};
pub use error::AecError;
pub use tap::{FrameSink, RawPcmTap};

#[cfg(feature = "audio-cpal")]
pub use audio::CpalBackend;
