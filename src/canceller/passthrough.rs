//! Stand-in canceller backend that performs no cancellation.
//!
//! Copies the near-end frame through unchanged, so the full pipeline
//! (alignment, pairing, recording, delivery) can be exercised end-to-end
//! before a real adaptive filter is plugged in. The output is a pure
//! function of the near-end input.

use tracing::debug;

use crate::canceller::{CancellerParams, EchoCanceller};

pub struct PassthroughCanceller;

impl PassthroughCanceller {
    pub fn new(params: CancellerParams) -> Self {
        debug!(?params, "passthrough canceller constructed");
        Self
    }
}

impl EchoCanceller for PassthroughCanceller {
    fn cancel(&mut self, near: &[i16], _far: &[i16], out: &mut [i16]) {
        out.copy_from_slice(near);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canceller::REFERENCE_CHANNELS;

    #[test]
    fn output_mirrors_near_end_input() {
        let params = CancellerParams {
            frame_size: 4,
            filter_length: 16,
            input_channels: 2,
            reference_channels: REFERENCE_CHANNELS,
            sample_rate: 16_000,
        };
        let mut canceller = PassthroughCanceller::new(params);

        let near: Vec<i16> = (0..8).collect();
        let far = [100i16; 4];
        let mut out = [0i16; 8];
        canceller.cancel(&near, &far, &mut out);

        assert_eq!(&out[..], &near[..]);
    }
}
