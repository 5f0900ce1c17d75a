//! Diagnostic frame recording.
//!
//! When enabled, the cancellation loop appends the near-end, far-end and
//! cancelled frames of every iteration to three byte sinks in lock-step
//! frame order. That ordering is what makes the recordings frame-aligned on
//! later playback, so a sink must never be written out of step with the
//! other two.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Receives the three frames of one cancellation tick, in frame order.
pub trait FrameSink: Send + 'static {
    fn record(&mut self, near: &[i16], far: &[i16], cancelled: &[i16]) -> io::Result<()>;
}

/// Writes each stream as raw little-endian 16-bit PCM.
pub struct RawPcmTap<W: Write> {
    near: W,
    far: W,
    cancelled: W,
}

impl<W: Write> RawPcmTap<W> {
    pub fn new(near: W, far: W, cancelled: W) -> Self {
        Self {
            near,
            far,
            cancelled,
        }
    }
}

impl RawPcmTap<BufWriter<File>> {
    /// Open three buffered file sinks, truncating existing files.
    pub fn create<P: AsRef<Path>>(near: P, far: P, cancelled: P) -> io::Result<Self> {
        Ok(Self::new(
            BufWriter::new(File::create(near)?),
            BufWriter::new(File::create(far)?),
            BufWriter::new(File::create(cancelled)?),
        ))
    }
}

fn write_pcm<W: Write>(sink: &mut W, samples: &[i16]) -> io::Result<()> {
    for &sample in samples {
        sink.write_all(&sample.to_le_bytes())?;
    }
    Ok(())
}

impl<W: Write + Send + 'static> FrameSink for RawPcmTap<W> {
    fn record(&mut self, near: &[i16], far: &[i16], cancelled: &[i16]) -> io::Result<()> {
        write_pcm(&mut self.near, near)?;
        write_pcm(&mut self.far, far)?;
        write_pcm(&mut self.cancelled, cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_streams_in_lock_step_frame_order() {
        let mut tap = RawPcmTap::new(Vec::new(), Vec::new(), Vec::new());

        tap.record(&[1, 2], &[10], &[-1, -2]).unwrap();
        tap.record(&[3, 4], &[20], &[-3, -4]).unwrap();

        let decode = |bytes: &[u8]| -> Vec<i16> {
            bytes
                .chunks_exact(2)
                .map(|b| i16::from_le_bytes([b[0], b[1]]))
                .collect()
        };

        assert_eq!(decode(&tap.near), vec![1, 2, 3, 4]);
        assert_eq!(decode(&tap.far), vec![10, 20]);
        assert_eq!(decode(&tap.cancelled), vec![-1, -2, -3, -4]);
    }
}
