//! Cancellable run state observed cooperatively by every polling loop.
//!
//! The flag is one-shot: once `request_stop` has been called it never resets
//! for the lifetime of the pipeline run. Every wait loop in the crate
//! re-checks it on each poll, so a stop request interrupts a stalled wait
//! within one poll interval rather than only between frames.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared stop handle for one pipeline run.
///
/// Clones observe the same flag. `request_stop` is a single atomic store,
/// making it safe to call from any context, including an async signal
/// handler installed by the embedding process.
#[derive(Clone, Debug, Default)]
pub struct RunState {
    stopping: Arc<AtomicBool>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent: repeated calls are indistinguishable
    /// from a single call.
    pub fn request_stop(&self) {
        self.stopping.store(true, Ordering::Release);
    }

    /// Whether shutdown has been requested.
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }
}
