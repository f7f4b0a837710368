//! Lock-free sample buffers between the synthesis tick and its consumers
//!
//! [`SampleRing`] feeds the output device: a single-producer single-consumer ring
//! that accepts a block only when all of it fits. [`ScopeTap`] keeps the most recent
//! mixed samples for the oscilloscope, discarding the oldest when full.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Fixed-capacity mono sample ring with an all-or-nothing write policy
pub struct SampleRing {
    queue: ArrayQueue<f32>,
    overflow_count: AtomicUsize,
    underrun_count: AtomicUsize,
}

impl SampleRing {
    /// Create a new ring buffer holding `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            overflow_count: AtomicUsize::new(0),
            underrun_count: AtomicUsize::new(0),
        }
    }

    /// Append a whole block, or nothing.
    ///
    /// Returns false (and counts an overflow) when the block does not fit. With a
    /// single producer the free space can only grow between the check and the
    /// writes, so an accepted block is never split.
    pub fn try_push_block(&self, block: &[f32]) -> bool {
        if self.free() < block.len() {
            self.overflow_count.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        for &sample in block {
            let _ = self.queue.push(sample);
        }
        true
    }

    /// Pop a sample, None if the buffer is empty
    pub fn pop(&self) -> Option<f32> {
        self.queue.pop()
    }

    /// Fill `out` from the ring, padding with silence.
    /// Returns the number of real samples copied; a short read counts as an underrun.
    pub fn read_into(&self, out: &mut [f32]) -> usize {
        let mut copied = 0;
        for slot in out.iter_mut() {
            match self.queue.pop() {
                Some(sample) => {
                    *slot = sample;
                    copied += 1;
                }
                None => *slot = 0.0,
            }
        }

        if copied < out.len() {
            self.underrun_count.fetch_add(1, Ordering::Relaxed);
        }
        copied
    }

    /// Discard all buffered samples
    pub fn clear(&self) {
        while self.queue.pop().is_some() {}
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Blocks rejected because the ring was too full
    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    /// Device reads that found fewer samples than requested
    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }

    /// Get fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.len() as f32 / self.capacity() as f32
    }
}

/// Thread-safe handle to a sample ring
pub type SharedSampleRing = Arc<SampleRing>;

pub fn create_shared_ring(capacity: usize) -> SharedSampleRing {
    Arc::new(SampleRing::new(capacity))
}

/// Bounded window of the most recent mixed samples
pub struct ScopeTap {
    queue: ArrayQueue<f32>,
}

impl ScopeTap {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Append samples, evicting the oldest when full
    pub fn extend(&self, samples: &[f32]) {
        for &sample in samples {
            let _ = self.queue.force_push(sample);
        }
    }

    /// Take everything currently buffered, oldest first
    pub fn drain(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.queue.len());
        while let Some(sample) = self.queue.pop() {
            out.push(sample);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

pub type SharedScopeTap = Arc<ScopeTap>;
