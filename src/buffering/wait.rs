//! Pluggable pause between ring-buffer polls.
//!
//! The pipeline has no blocking wait/notify: a consumer that finds
//! insufficient data pauses and re-polls, re-checking the run state on every
//! iteration. Production code pauses with a fixed sleep of half a frame
//! duration; tests substitute [`YieldWait`] for zero-latency synchronous
//! runs.

use std::time::Duration;

/// How a polling loop pauses when a ring has insufficient data or space.
pub trait WaitStrategy: Send + 'static {
    fn pause(&mut self);
}

/// Sleep a fixed interval between polls.
#[derive(Debug, Clone, Copy)]
pub struct SleepWait {
    interval: Duration,
}

impl SleepWait {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl WaitStrategy for SleepWait {
    fn pause(&mut self) {
        std::thread::sleep(self.interval);
    }
}

/// Yield the scheduler slot and re-poll immediately. Intended for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct YieldWait;

impl WaitStrategy for YieldWait {
    fn pause(&mut self) {
        std::thread::yield_now();
    }
}
