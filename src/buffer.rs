//! Fixed-capacity sample ring shared between the acquisition and telemetry
//! contexts.
//!
//! The arena is allocated once (usually in a `static`) and never grows. The
//! producer never blocks: when the ring is full the oldest entry is evicted.
//! Every operation runs in a short critical section, so one producer and one
//! consumer may live in different interrupt priorities.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::drivers::PhysicalSample;

/// Arena + head/length ring with overwrite-oldest insertion.
///
/// Each entry has an implicit sequence number: the number of entries pushed
/// before it. `head_seq` is the sequence number of the oldest live entry.
struct Ring<T: Copy, const N: usize> {
    slots: [T; N],
    head: usize,
    len: usize,
    head_seq: u64,
    evicted: u64,
}

impl<T: Copy, const N: usize> Ring<T, N> {
    const fn new(fill: T) -> Self {
        assert!(N > 0, "ring capacity must be non-zero");
        Self {
            slots: [fill; N],
            head: 0,
            len: 0,
            head_seq: 0,
            evicted: 0,
        }
    }

    fn push(&mut self, value: T) {
        if self.len == N {
            self.head = (self.head + 1) % N;
            self.head_seq += 1;
            self.evicted += 1;
            self.len -= 1;
        }
        self.slots[(self.head + self.len) % N] = value;
        self.len += 1;
    }

    fn peek_into<const M: usize>(&self, out: &mut Vec<T, M>, max: usize) -> u64 {
        let room = M - out.len();
        let count = self.len.min(max).min(room);
        for i in 0..count {
            // Cannot fail: count <= room
            let _ = out.push(self.slots[(self.head + i) % N]);
        }
        self.head_seq
    }

    /// Drop every live entry whose sequence number is below `end`.
    fn commit(&mut self, end: u64) -> usize {
        let count = (end.saturating_sub(self.head_seq) as usize).min(self.len);
        self.head = (self.head + count) % N;
        self.head_seq += count as u64;
        self.len -= count;
        count
    }

    fn clear(&mut self) {
        let len = self.len;
        self.commit(self.head_seq + len as u64);
    }
}

pub struct SampleBuffer<const N: usize> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Ring<PhysicalSample, N>>>,
}

impl<const N: usize> SampleBuffer<N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Ring::new(PhysicalSample::ZERO))),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Ring<PhysicalSample, N>) -> R) -> R {
        self.inner.lock(|ring| f(&mut ring.borrow_mut()))
    }

    /// Insert `sample`, evicting the oldest entry if full. Never blocks.
    pub fn push(&self, sample: PhysicalSample) {
        self.with(|ring| ring.push(sample));
    }

    /// Remove and return up to `max_count` (and at most `M`) of the oldest
    /// samples, oldest first. Empty when the buffer is empty.
    pub fn drain<const M: usize>(&self, max_count: usize) -> Vec<PhysicalSample, M> {
        let mut out = Vec::new();
        self.with(|ring| {
            let start = ring.peek_into(&mut out, max_count);
            ring.commit(start + out.len() as u64);
        });
        out
    }

    /// Copy up to `max_count` of the oldest samples into `out` without
    /// removing them. Returns the sequence number of the first one; pass
    /// `start + copied` to [`SampleBuffer::commit`] to remove them later.
    pub fn peek_into<const M: usize>(
        &self,
        out: &mut Vec<PhysicalSample, M>,
        max_count: usize,
    ) -> u64 {
        self.with(|ring| ring.peek_into(out, max_count))
    }

    /// Remove the entries with sequence numbers below `end` that are still
    /// present. Entries pushed after a peek are never removed.
    pub fn commit(&self, end: u64) -> usize {
        self.with(|ring| ring.commit(end))
    }

    pub fn len(&self) -> usize {
        self.with(|ring| ring.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Entries lost to overwrite since creation.
    pub fn evicted(&self) -> u64 {
        self.with(|ring| ring.evicted)
    }

    pub fn clear(&self) {
        self.with(|ring| ring.clear());
    }
}

impl<const N: usize> Default for SampleBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: u64) -> PhysicalSample {
        PhysicalSample {
            timestamp_us: t,
            ..PhysicalSample::ZERO
        }
    }

    fn stamps<const M: usize>(v: &Vec<PhysicalSample, M>) -> std::vec::Vec<u64> {
        v.iter().map(|s| s.timestamp_us).collect()
    }

    #[test]
    fn overflow_keeps_most_recent_in_order() {
        let buf = SampleBuffer::<10>::new();
        for t in 1..=15 {
            buf.push(sample(t));
        }
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.evicted(), 5);

        let out = buf.drain::<10>(10);
        assert_eq!(stamps(&out), (6..=15).collect::<std::vec::Vec<_>>());
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_after_any_overflow_returns_last_n() {
        const N: usize = 7;
        for pushes in N..4 * N {
            let buf = SampleBuffer::<N>::new();
            for t in 0..pushes as u64 {
                buf.push(sample(t));
            }
            let out = buf.drain::<N>(N);
            let expected: std::vec::Vec<u64> = ((pushes - N) as u64..pushes as u64).collect();
            assert_eq!(stamps(&out), expected, "after {} pushes", pushes);
        }
    }

    #[test]
    fn drain_on_empty_is_empty() {
        let buf = SampleBuffer::<4>::new();
        assert!(buf.drain::<4>(4).is_empty());
    }

    #[test]
    fn drain_is_bounded_by_request_and_output_capacity() {
        let buf = SampleBuffer::<8>::new();
        for t in 0..6 {
            buf.push(sample(t));
        }
        assert_eq!(stamps(&buf.drain::<8>(2)), vec![0, 1]);
        assert_eq!(stamps(&buf.drain::<3>(10)), vec![2, 3, 4]);
        assert_eq!(stamps(&buf.drain::<8>(10)), vec![5]);
    }

    #[test]
    fn peek_then_commit_removes_only_peeked() {
        let buf = SampleBuffer::<8>::new();
        for t in 0..5 {
            buf.push(sample(t));
        }
        let mut out = Vec::<PhysicalSample, 3>::new();
        let start = buf.peek_into(&mut out, 3);
        assert_eq!(stamps(&out), vec![0, 1, 2]);
        assert_eq!(buf.len(), 5);

        buf.push(sample(5));
        assert_eq!(buf.commit(start + out.len() as u64), 3);
        assert_eq!(stamps(&buf.drain::<8>(8)), vec![3, 4, 5]);
    }

    #[test]
    fn commit_after_eviction_spares_newer_entries() {
        let buf = SampleBuffer::<4>::new();
        for t in 0..4 {
            buf.push(sample(t));
        }
        let mut out = Vec::<PhysicalSample, 4>::new();
        let start = buf.peek_into(&mut out, 2);

        // Producer overruns while the peeked samples are in flight.
        for t in 4..7 {
            buf.push(sample(t));
        }
        assert_eq!(buf.commit(start + out.len() as u64), 0);
        assert_eq!(stamps(&buf.drain::<4>(4)), vec![3, 4, 5, 6]);
    }

    #[test]
    fn clear_discards_everything() {
        let buf = SampleBuffer::<4>::new();
        for t in 0..3 {
            buf.push(sample(t));
        }
        buf.clear();
        assert!(buf.is_empty());
        buf.push(sample(9));
        assert_eq!(stamps(&buf.drain::<4>(4)), vec![9]);
    }

    #[test]
    fn producer_and_consumer_on_separate_threads() {
        use std::sync::Arc;

        const TOTAL: u64 = 10_000;
        let buf = Arc::new(SampleBuffer::<32>::new());

        let producer = {
            let buf = buf.clone();
            std::thread::spawn(move || {
                for t in 0..TOTAL {
                    buf.push(sample(t));
                }
            })
        };

        let mut last = None;
        let mut received = 0u64;
        loop {
            let done = producer.is_finished();
            for s in buf.drain::<16>(16) {
                if let Some(prev) = last {
                    assert!(s.timestamp_us > prev);
                }
                last = Some(s.timestamp_us);
                received += 1;
            }
            if done && buf.is_empty() {
                break;
            }
        }
        producer.join().unwrap();

        assert_eq!(last, Some(TOTAL - 1));
        assert_eq!(received + buf.evicted(), TOTAL);
    }
}
