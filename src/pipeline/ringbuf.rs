//! Drop-oldest frame ring on the consumer side

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::utils::CachePadded;
use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;

use crate::capture::Frame;

/// Bounded queue of recent frames. A push into a full ring evicts the
/// oldest frame.
pub struct FrameRingBuffer {
    ring: HeapRb<Frame>,
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    written: AtomicUsize,
    read: AtomicUsize,
    evicted: AtomicUsize,
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingStats {
    pub written: usize,
    pub read: usize,
    pub evicted: usize,
}

impl FrameRingBuffer {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: HeapRb::new(capacity.max(1)),
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Store `frame`, returning the frame it evicted, if any.
    pub fn push(&mut self, frame: Frame) -> Option<Frame> {
        let evicted = self.ring.push_overwrite(frame);
        self.stats.written.fetch_add(1, Ordering::Relaxed);
        if evicted.is_some() {
            self.stats.evicted.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }

    /// Oldest frame still held.
    pub fn pop(&mut self) -> Option<Frame> {
        let frame = self.ring.try_pop()?;
        self.stats.read.fetch_add(1, Ordering::Relaxed);
        Some(frame)
    }

    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity().get()
    }

    pub fn stats(&self) -> RingStats {
        RingStats {
            written: self.stats.written.load(Ordering::Relaxed),
            read: self.stats.read.load(Ordering::Relaxed),
            evicted: self.stats.evicted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use bytes::Bytes;

    use super::*;
    use crate::capture::{FrameMetadata, OutputFormat};

    fn frame(sequence: u64) -> Frame {
        Frame {
            data: Bytes::from(vec![sequence as u8; 4]),
            meta: Arc::new(FrameMetadata {
                sequence,
                width: 2,
                height: 1,
                stride: 4,
                format: OutputFormat::Yuyv,
                device_timestamp: None,
            }),
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn full_ring_evicts_oldest() {
        let mut ring = FrameRingBuffer::new(2);
        assert!(ring.push(frame(0)).is_none());
        assert!(ring.push(frame(1)).is_none());
        let evicted = ring.push(frame(2)).unwrap();
        assert_eq!(evicted.meta.sequence, 0);
        assert_eq!(ring.len(), 2);

        assert_eq!(ring.pop().unwrap().meta.sequence, 1);
        assert_eq!(ring.pop().unwrap().meta.sequence, 2);
        assert!(ring.pop().is_none());
        assert_eq!(
            ring.stats(),
            RingStats {
                written: 3,
                read: 2,
                evicted: 1
            }
        );
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut ring = FrameRingBuffer::new(0);
        assert_eq!(ring.capacity(), 1);
        ring.push(frame(7));
        assert!(!ring.is_empty());
    }
}
