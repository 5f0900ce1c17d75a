//! `AecEngine`, the top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! AecEngine::new(config)          → config validated, status = Idle
//!     └─► start(backend, …)       → rings built, pipeline thread spawned,
//!                                   backend opened on that thread, status = Running
//!         └─► stop()              → stop requested, in-flight frame completes,
//!                                   worker joined, status = Stopped
//! ```
//!
//! The run state is one-shot (once stopping, it never resets), so an engine
//! runs at most once; restarting means constructing a new engine.
//!
//! ## Threading
//!
//! Device streams are `!Send` on Windows/macOS, so the backend is started
//! *inside* the pipeline thread and its guard is dropped there after the
//! loop exits. A bounded(1) channel propagates the open result back to the
//! `start()` caller.

pub mod pipeline;

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::anyhow;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audio::{AudioBackend, AudioParams};
use crate::buffering::{
    stream_ring,
    wait::{SleepWait, WaitStrategy},
    StreamConsumer, StreamProducer,
};
use crate::canceller::{CancellerParams, EchoCanceller, REFERENCE_CHANNELS};
use crate::control::RunState;
use crate::error::{AecError, Result};
use crate::tap::FrameSink;

/// Configuration for one pipeline run.
///
/// Values, not flag syntax: the embedding process owns argument parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sample rate in Hz. Default: 16000.
    pub sample_rate: u32,
    /// Near-end interleaved channel count. Default: 2.
    pub input_channels: usize,
    /// Capacity (in samples) of the PLAYBACK and PROCESSED rings.
    /// Rounded up to a power of two. Default: 16384.
    pub buffer_samples: usize,
    /// System delay between playback and capture, in sample frames,
    /// discarded from CAPTURE once at startup. Default: 0.
    pub delay_samples: usize,
    /// Adaptive filter length handed to the canceller. Default: 2048.
    pub filter_length: usize,
    /// Frame duration. Kept as a configuration value rather than a literal
    /// so alternate tick sizes can be tested. Default: 10 ms.
    pub tick: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            input_channels: 2,
            buffer_samples: 16_384,
            delay_samples: 0,
            filter_length: 2_048,
            tick: Duration::from_millis(10),
        }
    }
}

impl PipelineConfig {
    /// Samples per channel per tick.
    pub fn frame_size(&self) -> usize {
        (self.sample_rate as u128 * self.tick.as_micros() / 1_000_000) as usize
    }

    /// Near-end/cancelled frame length in interleaved samples.
    pub fn near_frame_len(&self) -> usize {
        self.frame_size() * self.input_channels
    }

    /// Far-end reference frame length in samples (mono).
    pub fn far_frame_len(&self) -> usize {
        self.frame_size() * REFERENCE_CHANNELS
    }

    /// Pause between polls: half of one frame's duration.
    pub fn poll_interval(&self) -> Duration {
        self.tick / 2
    }

    /// Geometry for constructing an echo-canceller session.
    pub fn canceller_params(&self) -> CancellerParams {
        CancellerParams {
            frame_size: self.frame_size(),
            filter_length: self.filter_length,
            input_channels: self.input_channels,
            reference_channels: REFERENCE_CHANNELS,
            sample_rate: self.sample_rate,
        }
    }

    /// Reject malformed configuration before any state is built.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(AecError::InvalidConfig("sample_rate must be non-zero".into()));
        }
        if self.input_channels == 0 {
            return Err(AecError::InvalidConfig(
                "input_channels must be non-zero".into(),
            ));
        }
        if self.frame_size() == 0 {
            return Err(AecError::InvalidConfig(format!(
                "tick of {:?} at {} Hz yields an empty frame",
                self.tick, self.sample_rate
            )));
        }
        if self.filter_length == 0 {
            return Err(AecError::InvalidConfig(
                "filter_length must be non-zero".into(),
            ));
        }
        // PROCESSED must hold at least one cancelled frame or the output
        // write could never complete.
        if self.buffer_samples.max(1).next_power_of_two() < self.near_frame_len() {
            return Err(AecError::InvalidConfig(format!(
                "buffer_samples {} cannot hold one {}-sample output frame",
                self.buffer_samples,
                self.near_frame_len()
            )));
        }
        Ok(())
    }
}

/// Current state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine created but `start()` not yet called.
    Idle,
    /// Pipeline thread active.
    Running,
    /// Run finished; the engine cannot be restarted.
    Stopped,
    /// Startup failed; the pipeline never ran.
    Error,
}

/// The two stream endpoints exposed to the external ingress/egress
/// transport: far-end audio is written into `playback`, cancelled near-end
/// audio is read from `processed`.
pub struct StreamIo {
    pub playback: StreamProducer,
    pub processed: StreamConsumer,
}

/// The top-level engine handle.
///
/// `AecEngine` is `Send + Sync` (all fields use interior mutability), so it
/// can be shared behind an `Arc` with a signal handler that calls
/// `run_state().request_stop()`.
pub struct AecEngine {
    config: PipelineConfig,
    run: RunState,
    status: Arc<Mutex<EngineStatus>>,
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AecEngine {
    /// Create a new engine for one pipeline run.
    ///
    /// # Errors
    /// `AecError::InvalidConfig` if the configuration is rejected.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            run: RunState::new(),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
            worker: Mutex::new(None),
        })
    }

    /// Start the backend and the cancellation pipeline.
    ///
    /// Blocks until the audio device path is confirmed open (or fails), then
    /// returns the [`StreamIo`] endpoints for the external transport. The
    /// pipeline continues running on a dedicated thread.
    ///
    /// # Errors
    /// - `AecError::AlreadyRunning` / `AecError::AlreadyStopped` when called
    ///   out of the `Idle` state.
    /// - Any backend open failure, propagated verbatim.
    pub fn start(
        &self,
        backend: Box<dyn AudioBackend>,
        canceller: Box<dyn EchoCanceller>,
        tap: Option<Box<dyn FrameSink>>,
    ) -> Result<StreamIo> {
        {
            let mut status = self.status.lock();
            match *status {
                EngineStatus::Idle => {}
                EngineStatus::Running => return Err(AecError::AlreadyRunning),
                EngineStatus::Stopped | EngineStatus::Error => {
                    return Err(AecError::AlreadyStopped)
                }
            }
            *status = EngineStatus::Running;
        }

        let (playback_prod, playback_cons) = stream_ring(self.config.buffer_samples);
        let (processed_prod, processed_cons) = stream_ring(self.config.buffer_samples);

        let config = self.config.clone();
        let run = self.run.clone();
        let status = Arc::clone(&self.status);
        let diagnostics = Arc::clone(&self.diagnostics);
        let params = AudioParams {
            sample_rate: config.sample_rate,
            input_channels: config.input_channels,
        };
        let mut backend = backend;

        // Bounded(1) handshake: the pipeline thread reports whether the
        // device path opened before start() returns.
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);

        let spawned = std::thread::Builder::new()
            .name("aec-pipeline".into())
            .spawn(move || {
                // Device streams are thread-bound: open them here, drop the
                // guard here.
                let mut started = match backend.start(playback_cons, run.clone(), &params) {
                    Ok(started) => {
                        let _ = ready_tx.send(Ok(()));
                        started
                    }
                    Err(e) => {
                        *status.lock() = EngineStatus::Error;
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let wait: Box<dyn WaitStrategy> = Box::new(SleepWait::new(config.poll_interval()));
                pipeline::run(pipeline::PipelineContext {
                    config,
                    canceller,
                    capture: started.capture,
                    played: started.played,
                    processed: processed_prod,
                    run,
                    tap,
                    wait,
                    diagnostics,
                });

                started.guard.stop();
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                *self.status.lock() = EngineStatus::Error;
                return Err(e.into());
            }
        };

        *self.worker.lock() = Some(handle);

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("engine started");
                Ok(StreamIo {
                    playback: playback_prod,
                    processed: processed_cons,
                })
            }
            Ok(Err(e)) => {
                self.run.request_stop();
                self.join_worker();
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message was sent: the thread died
                // during startup.
                self.run.request_stop();
                self.join_worker();
                *self.status.lock() = EngineStatus::Error;
                Err(AecError::Other(anyhow!(
                    "pipeline thread died during startup"
                )))
            }
        }
    }

    /// Request shutdown and wait for the in-flight frame to complete.
    ///
    /// # Errors
    /// `AecError::NotRunning` when the pipeline is not active.
    pub fn stop(&self) -> Result<()> {
        if *self.status.lock() != EngineStatus::Running {
            return Err(AecError::NotRunning);
        }

        info!("engine stop requested");
        self.run.request_stop();
        self.join_worker();
        *self.status.lock() = EngineStatus::Stopped;
        Ok(())
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    /// Clone of the run-state handle, for signal handlers and watchdogs.
    pub fn run_state(&self) -> RunState {
        self.run.clone()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    fn join_worker(&self) {
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                tracing::error!("pipeline thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_frame_math() {
        let config = PipelineConfig::default();
        assert_eq!(config.frame_size(), 160);
        assert_eq!(config.near_frame_len(), 320);
        assert_eq!(config.far_frame_len(), 160);
        assert_eq!(config.poll_interval(), Duration::from_millis(5));
        config.validate().expect("default config is valid");
    }

    #[test]
    fn canceller_params_mirror_the_config() {
        let config = PipelineConfig {
            sample_rate: 48_000,
            input_channels: 1,
            filter_length: 4_096,
            ..PipelineConfig::default()
        };
        let params = config.canceller_params();
        assert_eq!(params.frame_size, 480);
        assert_eq!(params.filter_length, 4_096);
        assert_eq!(params.input_channels, 1);
        assert_eq!(params.reference_channels, 1);
        assert_eq!(params.sample_rate, 48_000);
    }

    #[test]
    fn validation_rejects_degenerate_configs() {
        let zero_rate = PipelineConfig {
            sample_rate: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            zero_rate.validate(),
            Err(AecError::InvalidConfig(_))
        ));

        let zero_channels = PipelineConfig {
            input_channels: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            zero_channels.validate(),
            Err(AecError::InvalidConfig(_))
        ));

        let empty_frame = PipelineConfig {
            tick: Duration::from_micros(1),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            empty_frame.validate(),
            Err(AecError::InvalidConfig(_))
        ));

        let tiny_buffer = PipelineConfig {
            buffer_samples: 64,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            tiny_buffer.validate(),
            Err(AecError::InvalidConfig(_))
        ));
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = PipelineConfig {
            sample_rate: 32_000,
            input_channels: 4,
            delay_samples: 640,
            ..PipelineConfig::default()
        };
        let json = serde_json::to_string(&config).expect("serialize config");
        let back: PipelineConfig = serde_json::from_str(&json).expect("deserialize config");
        assert_eq!(back.sample_rate, 32_000);
        assert_eq!(back.input_channels, 4);
        assert_eq!(back.delay_samples, 640);
        assert_eq!(back.tick, config.tick);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let back: PipelineConfig =
            serde_json::from_str(r#"{"sample_rate": 8000}"#).expect("deserialize partial config");
        assert_eq!(back.sample_rate, 8_000);
        assert_eq!(back.input_channels, 2);
        assert_eq!(back.frame_size(), 80);
    }
}
