//! Bounded single-producer/single-consumer ring buffer for PCM samples.
//!
//! The pipeline is wired from four of these rings (PLAYBACK, CAPTURE,
//! PLAYED, PROCESSED), each with exactly one writer and one reader running
//! on independently-clocked threads. There is no internal blocking: a
//! `push_slice`/`pop_slice` transfers whatever fits and reports the count,
//! and all waiting is done by the caller via polling (see
//! [`wait::WaitStrategy`]).
//!
//! Capacity is rounded up to a power of two so wraparound addressing is a
//! branch-free mask. The read and write indices increase monotonically and
//! are masked only when addressing; index arithmetic uses wrapping
//! subtraction, so `usize` overflow is harmless.
//!
//! Element slots are `AtomicI16` and index publication uses Release/Acquire
//! pairs. Each side mutates only its own index and only reads the other's;
//! a Release store of an index makes the slots it covers visible to the
//! Acquire load on the other side.

pub mod wait;

use std::sync::{
    atomic::{AtomicI16, AtomicUsize, Ordering},
    Arc,
};

struct RingShared {
    data: Box<[AtomicI16]>,
    /// `capacity - 1`; capacity is a power of two.
    mask: usize,
    /// Total samples ever written. Owned by the producer.
    write: AtomicUsize,
    /// Total samples ever read or skipped. Owned by the consumer.
    read: AtomicUsize,
}

impl RingShared {
    fn capacity(&self) -> usize {
        self.data.len()
    }
}

/// Write half of a stream ring. Held by exactly one thread; not `Clone`.
pub struct StreamProducer {
    ring: Arc<RingShared>,
}

/// Read half of a stream ring. Held by exactly one thread; not `Clone`.
pub struct StreamConsumer {
    ring: Arc<RingShared>,
}

/// Create a matched producer/consumer pair backed by a heap-allocated ring.
///
/// `capacity` is rounded up to the next power of two (minimum 1). The ring
/// is allocated once here and never resized.
pub fn stream_ring(capacity: usize) -> (StreamProducer, StreamConsumer) {
    let capacity = capacity.max(1).next_power_of_two();
    let data: Box<[AtomicI16]> = (0..capacity).map(|_| AtomicI16::new(0)).collect();
    let ring = Arc::new(RingShared {
        data,
        mask: capacity - 1,
        write: AtomicUsize::new(0),
        read: AtomicUsize::new(0),
    });
    (
        StreamProducer {
            ring: Arc::clone(&ring),
        },
        StreamConsumer { ring },
    )
}

impl StreamProducer {
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Samples currently buffered.
    pub fn occupied_len(&self) -> usize {
        let write = self.ring.write.load(Ordering::Relaxed);
        let read = self.ring.read.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Free slots available to write.
    pub fn vacant_len(&self) -> usize {
        self.ring.capacity() - self.occupied_len()
    }

    /// Copy up to `samples.len()` samples into the ring and advance the
    /// write index by the count actually copied.
    ///
    /// Returns that count. When fewer slots are free than requested only the
    /// free slots are written; the caller re-issues for the remainder or
    /// accepts partial delivery. Never blocks, never grows.
    pub fn push_slice(&mut self, samples: &[i16]) -> usize {
        let read = self.ring.read.load(Ordering::Acquire);
        let write = self.ring.write.load(Ordering::Relaxed);
        let vacant = self.ring.capacity() - write.wrapping_sub(read);
        let count = samples.len().min(vacant);

        for (offset, &sample) in samples[..count].iter().enumerate() {
            let slot = write.wrapping_add(offset) & self.ring.mask;
            self.ring.data[slot].store(sample, Ordering::Relaxed);
        }

        // Publish the filled region to the consumer.
        self.ring
            .write
            .store(write.wrapping_add(count), Ordering::Release);
        count
    }
}

impl StreamConsumer {
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Samples available to read.
    pub fn occupied_len(&self) -> usize {
        let write = self.ring.write.load(Ordering::Acquire);
        let read = self.ring.read.load(Ordering::Relaxed);
        write.wrapping_sub(read)
    }

    /// Free slots available to the producer.
    pub fn vacant_len(&self) -> usize {
        self.ring.capacity() - self.occupied_len()
    }

    /// Copy up to `out.len()` samples out of the ring and advance the read
    /// index by the count actually copied. Returns that count.
    pub fn pop_slice(&mut self, out: &mut [i16]) -> usize {
        let write = self.ring.write.load(Ordering::Acquire);
        let read = self.ring.read.load(Ordering::Relaxed);
        let occupied = write.wrapping_sub(read);
        let count = out.len().min(occupied);

        for (offset, slot_out) in out[..count].iter_mut().enumerate() {
            let slot = read.wrapping_add(offset) & self.ring.mask;
            *slot_out = self.ring.data[slot].load(Ordering::Relaxed);
        }

        // Release the drained region back to the producer.
        self.ring
            .read
            .store(read.wrapping_add(count), Ordering::Release);
        count
    }

    /// Discard up to `count` samples without copying them out.
    ///
    /// Used by the delay aligner to drop the initial capture samples that
    /// predate the first played reference sample. Returns the count actually
    /// discarded (clamped to what is buffered).
    pub fn skip(&mut self, count: usize) -> usize {
        let write = self.ring.write.load(Ordering::Acquire);
        let read = self.ring.read.load(Ordering::Relaxed);
        let occupied = write.wrapping_sub(read);
        let count = count.min(occupied);

        self.ring
            .read
            .store(read.wrapping_add(count), Ordering::Release);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn capacity_rounds_up_to_power_of_two() {
        let (producer, _consumer) = stream_ring(1000);
        assert_eq!(producer.capacity(), 1024);
        let (producer, _consumer) = stream_ring(16);
        assert_eq!(producer.capacity(), 16);
    }

    #[test]
    fn fifo_order_is_exact_across_the_wraparound_boundary() {
        let (mut producer, mut consumer) = stream_ring(8);
        let mut next_in = 0i16;
        let mut next_out = 0i16;
        let mut scratch = [0i16; 5];

        // Interleaved writes and reads whose running difference never
        // exceeds capacity, repeatedly crossing the modulo boundary.
        for _ in 0..100 {
            let chunk: Vec<i16> = (0..5).map(|i| next_in + i).collect();
            assert_eq!(producer.push_slice(&chunk), 5);
            next_in += 5;

            assert_eq!(consumer.pop_slice(&mut scratch), 5);
            for &sample in &scratch {
                assert_eq!(sample, next_out);
                next_out += 1;
            }
        }
    }

    #[test]
    fn partial_write_transfers_exactly_the_vacant_count() {
        let (mut producer, mut consumer) = stream_ring(8);
        assert_eq!(producer.push_slice(&[1; 6]), 6);
        assert_eq!(producer.vacant_len(), 2);

        // Request more than fits: exactly vacant_len() is accepted.
        assert_eq!(producer.push_slice(&[2; 6]), 2);
        assert_eq!(producer.push_slice(&[3; 4]), 0);

        let mut out = [0i16; 8];
        assert_eq!(consumer.pop_slice(&mut out), 8);
        assert_eq!(out, [1, 1, 1, 1, 1, 1, 2, 2]);
    }

    #[test]
    fn partial_read_transfers_exactly_the_occupied_count() {
        let (mut producer, mut consumer) = stream_ring(8);
        producer.push_slice(&[7; 3]);

        let mut out = [0i16; 8];
        assert_eq!(consumer.pop_slice(&mut out), 3);
        assert_eq!(consumer.pop_slice(&mut out), 0);
    }

    #[test]
    fn skip_discards_without_copying_and_clamps() {
        let (mut producer, mut consumer) = stream_ring(16);
        let samples: Vec<i16> = (0..10).collect();
        producer.push_slice(&samples);

        assert_eq!(consumer.skip(4), 4);
        assert_eq!(consumer.occupied_len(), 6);

        let mut out = [0i16; 2];
        consumer.pop_slice(&mut out);
        assert_eq!(out, [4, 5]);

        // More than is buffered: clamped to what remains.
        assert_eq!(consumer.skip(100), 4);
        assert_eq!(consumer.occupied_len(), 0);
    }

    #[test]
    fn available_counts_are_consistent() {
        let (mut producer, mut consumer) = stream_ring(8);
        assert_eq!(producer.vacant_len(), 8);
        assert_eq!(consumer.occupied_len(), 0);

        producer.push_slice(&[0; 5]);
        assert_eq!(producer.occupied_len(), 5);
        assert_eq!(producer.vacant_len(), 3);
        assert_eq!(consumer.occupied_len(), 5);
        assert_eq!(consumer.vacant_len(), 3);

        let mut out = [0i16; 2];
        consumer.pop_slice(&mut out);
        assert_eq!(consumer.occupied_len(), 3);
        assert_eq!(producer.vacant_len(), 5);
    }

    #[test]
    fn cross_thread_transfer_preserves_every_sample_in_order() {
        const TOTAL: usize = 50_000;
        let (mut producer, mut consumer) = stream_ring(64);

        let writer = thread::spawn(move || {
            let mut sent = 0usize;
            while sent < TOTAL {
                let sample = (sent % 0x7fff) as i16;
                if producer.push_slice(&[sample]) == 1 {
                    sent += 1;
                } else {
                    thread::yield_now();
                }
            }
        });

        let mut received = 0usize;
        let mut out = [0i16; 32];
        while received < TOTAL {
            let got = consumer.pop_slice(&mut out);
            if got == 0 {
                thread::yield_now();
                continue;
            }
            for &sample in &out[..got] {
                assert_eq!(sample, (received % 0x7fff) as i16);
                received += 1;
            }
        }

        writer.join().expect("writer thread panicked");
    }
}
