//! Duplex audio backend via cpal.
//!
//! # Design constraints
//!
//! Both device callbacks run on OS audio threads at elevated priority. They
//! **must not** allocate after startup, block on a lock, or perform I/O; the
//! only work done is copying through the SPSC rings (scratch buffers are
//! pre-sized before the streams start).
//!
//! The output callback is also where the PLAYED reference is produced: every
//! mono sample actually delivered to the DAC, including silence substituted
//! on a PLAYBACK underrun, is mirrored into the PLAYED ring. That keeps the
//! far-end reference aligned with the physical playback rather than with
//! what the ingress transport managed to feed us.

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, SampleFormat, SampleRate, Stream, StreamConfig,
};
use tracing::{error, info, warn};

use crate::audio::{AudioBackend, AudioGuard, AudioParams, StartedAudio};
use crate::buffering::{stream_ring, StreamConsumer, StreamProducer};
use crate::control::RunState;
use crate::error::{AecError, Result};

/// Hardware backend built on the default cpal host.
pub struct CpalBackend {
    preferred_output: Option<String>,
    preferred_input: Option<String>,
}

impl CpalBackend {
    /// Use the system default input and output devices.
    pub fn new() -> Self {
        Self {
            preferred_output: None,
            preferred_input: None,
        }
    }

    /// Prefer devices by name, falling back to the defaults when a name is
    /// not found.
    pub fn with_devices(preferred_input: Option<String>, preferred_output: Option<String>) -> Self {
        Self {
            preferred_output,
            preferred_input,
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32_768.0
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32_768.0).clamp(-32_768.0, 32_767.0) as i16
}

fn resolve_device<I>(
    devices: std::result::Result<I, cpal::DevicesError>,
    preferred: Option<&str>,
    default: Option<Device>,
) -> Option<Device>
where
    I: Iterator<Item = Device>,
{
    if let Some(preferred_name) = preferred {
        match devices {
            Ok(mut devices) => {
                let found = devices.find(|device| {
                    device
                        .name()
                        .map(|name| name == preferred_name)
                        .unwrap_or(false)
                });
                if let Some(device) = found {
                    return Some(device);
                }
                warn!("preferred device '{}' not found, falling back", preferred_name);
            }
            Err(e) => {
                warn!("failed to list devices while resolving preference: {e}");
            }
        }
    }
    default
}

fn build_output(
    device: &Device,
    sample_rate: u32,
    mut playback: StreamConsumer,
    mut played: StreamProducer,
    run: RunState,
) -> Result<Stream> {
    let supported = device
        .default_output_config()
        .map_err(|e| AecError::AudioDevice(e.to_string()))?;
    let channels = supported.channels();
    let config = StreamConfig {
        channels,
        sample_rate: SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        device = device.name().unwrap_or_default().as_str(),
        channels, sample_rate, "opening output device"
    );

    let ch = channels as usize;
    // Reused mono scratch; sized generously up front so the callback never
    // allocates in steady state.
    let mut mono: Vec<i16> = Vec::with_capacity(sample_rate as usize);

    let stream = match supported.sample_format() {
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _info| {
                if run.is_stopping() {
                    data.fill(0.0);
                    return;
                }
                let frames = data.len() / ch;
                mono.resize(frames, 0);
                let got = playback.pop_slice(&mut mono[..frames]);
                // Underrun: the remainder of the block plays silence, and
                // the reference must say so too.
                mono[got..frames].fill(0);
                let mirrored = played.push_slice(&mono[..frames]);
                if mirrored < frames {
                    warn!(
                        "reference ring full: dropped {} played samples",
                        frames - mirrored
                    );
                }
                for frame in 0..frames {
                    let value = i16_to_f32(mono[frame]);
                    for c in 0..ch {
                        data[frame * ch + c] = value;
                    }
                }
            },
            |err| error!("output stream error: {err}"),
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _info| {
                if run.is_stopping() {
                    data.fill(0);
                    return;
                }
                let frames = data.len() / ch;
                mono.resize(frames, 0);
                let got = playback.pop_slice(&mut mono[..frames]);
                mono[got..frames].fill(0);
                let mirrored = played.push_slice(&mono[..frames]);
                if mirrored < frames {
                    warn!(
                        "reference ring full: dropped {} played samples",
                        frames - mirrored
                    );
                }
                for frame in 0..frames {
                    let value = mono[frame];
                    for c in 0..ch {
                        data[frame * ch + c] = value;
                    }
                }
            },
            |err| error!("output stream error: {err}"),
            None,
        ),
        fmt => {
            return Err(AecError::AudioStream(format!(
                "unsupported output sample format: {fmt:?}"
            )))
        }
    }
    .map_err(|e| AecError::AudioStream(e.to_string()))?;

    Ok(stream)
}

fn build_input(
    device: &Device,
    sample_rate: u32,
    input_channels: usize,
    mut capture: StreamProducer,
    run: RunState,
) -> Result<Stream> {
    let supported = device
        .default_input_config()
        .map_err(|e| AecError::AudioDevice(e.to_string()))?;
    let config = StreamConfig {
        channels: input_channels as u16,
        sample_rate: SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        device = device.name().unwrap_or_default().as_str(),
        channels = input_channels,
        sample_rate,
        "opening input device"
    );

    let mut convert_buf: Vec<i16> = Vec::with_capacity(sample_rate as usize);

    let stream = match supported.sample_format() {
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _info| {
                if run.is_stopping() {
                    return;
                }
                let written = capture.push_slice(data);
                if written < data.len() {
                    warn!(
                        "capture ring full: dropped {} near-end samples",
                        data.len() - written
                    );
                }
            },
            |err| error!("input stream error: {err}"),
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _info| {
                if run.is_stopping() {
                    return;
                }
                convert_buf.resize(data.len(), 0);
                for (slot, &sample) in convert_buf.iter_mut().zip(data) {
                    *slot = f32_to_i16(sample);
                }
                let written = capture.push_slice(&convert_buf);
                if written < data.len() {
                    warn!(
                        "capture ring full: dropped {} near-end samples",
                        data.len() - written
                    );
                }
            },
            |err| error!("input stream error: {err}"),
            None,
        ),
        fmt => {
            return Err(AecError::AudioStream(format!(
                "unsupported input sample format: {fmt:?}"
            )))
        }
    }
    .map_err(|e| AecError::AudioStream(e.to_string()))?;

    Ok(stream)
}

struct CpalGuard {
    output: Stream,
    input: Stream,
}

impl AudioGuard for CpalGuard {
    fn stop(&mut self) {
        if let Err(e) = self.input.pause() {
            warn!("failed to pause input stream: {e}");
        }
        if let Err(e) = self.output.pause() {
            warn!("failed to pause output stream: {e}");
        }
    }
}

impl AudioBackend for CpalBackend {
    fn start(
        &mut self,
        playback: StreamConsumer,
        run: RunState,
        params: &AudioParams,
    ) -> Result<StartedAudio> {
        let host = cpal::default_host();

        let output_device = resolve_device(
            host.output_devices(),
            self.preferred_output.as_deref(),
            host.default_output_device(),
        )
        .ok_or(AecError::NoDefaultOutputDevice)?;
        let input_device = resolve_device(
            host.input_devices(),
            self.preferred_input.as_deref(),
            host.default_input_device(),
        )
        .ok_or(AecError::NoDefaultInputDevice)?;

        // Backend-chosen capacities: about one second of audio each.
        let (capture_prod, capture) =
            stream_ring(params.sample_rate as usize * params.input_channels);
        let (played_prod, played) = stream_ring(params.sample_rate as usize);

        let output = build_output(
            &output_device,
            params.sample_rate,
            playback,
            played_prod,
            run.clone(),
        )?;
        let input = build_input(
            &input_device,
            params.sample_rate,
            params.input_channels,
            capture_prod,
            run,
        )?;

        output
            .play()
            .map_err(|e| AecError::AudioStream(e.to_string()))?;
        input
            .play()
            .map_err(|e| AecError::AudioStream(e.to_string()))?;

        Ok(StartedAudio {
            capture,
            played,
            guard: Box::new(CpalGuard { output, input }),
        })
    }
}
