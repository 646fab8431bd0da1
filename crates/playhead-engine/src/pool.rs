//! Per-clip buffer pool: the available/computed queue pair.
//!
//! One mutex (the render lock) guards both queues; it is held only for the
//! duration of a queue pop/push, never across a blocking wait. Two condition
//! variables bridge the decoder's delivery thread and the consumer thread:
//! `computed_ready` wakes a consumer waiting for a decoded frame,
//! `slot_free` wakes a decoder waiting for pool capacity (backpressure).

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

pub(crate) struct QueueInner<B> {
    /// Buffers owned by the pool, ready to be filled by the decoder.
    pub available: VecDeque<B>,
    /// Buffers filled by the decoder, awaiting consumption in FIFO order.
    pub computed: VecDeque<B>,
    /// Set while the clip is stopped or stopping. A draining queue refuses
    /// lock requests so a racing decoder cannot re-populate `computed`.
    pub draining: bool,
    /// Bumped on every flush. A delivery whose lease predates the current
    /// epoch was filled against a stale decoder clock and is discarded.
    pub epoch: u64,
    /// Armed by a resync flush: the next accepted delivery must carry this
    /// PTS. A post-flush lease can still be filled from the pre-seek clock
    /// when the seek races the decoder's position read; the PTS gate
    /// rejects it where the epoch cannot.
    pub expected_pts: Option<i64>,
    pub previous_pts: i64,
    pub current_pts: i64,
}

/// Fixed-capacity queue pair for one clip workflow.
///
/// Conservation invariant: `available + computed + buffers leased to the
/// decoder + outstanding StackedBuffers == capacity`, always. The pool never
/// grows; exhaustion stalls the decoder instead of allocating.
pub struct BufferQueues<B> {
    pub(crate) inner: Mutex<QueueInner<B>>,
    pub(crate) computed_ready: Condvar,
    pub(crate) slot_free: Condvar,
    capacity: usize,
}

impl<B> BufferQueues<B> {
    /// Build a pool from pre-allocated buffers. Capacity is fixed here.
    pub fn new(buffers: Vec<B>) -> Self {
        let capacity = buffers.len();
        Self {
            inner: Mutex::new(QueueInner {
                available: buffers.into(),
                computed: VecDeque::with_capacity(capacity),
                draining: true,
                epoch: 0,
                expected_pts: None,
                previous_pts: 0,
                current_pts: 0,
            }),
            computed_ready: Condvar::new(),
            slot_free: Condvar::new(),
            capacity,
        }
    }

    /// Pool capacity fixed at construction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffers ready for the decoder to fill.
    pub fn available_len(&self) -> usize {
        self.inner.lock().available.len()
    }

    /// Decoded buffers awaiting consumption.
    pub fn computed_len(&self) -> usize {
        self.inner.lock().computed.len()
    }

    /// Buffers neither pooled nor computed: leased to the decoder or handed
    /// to a consumer as a StackedBuffer.
    pub fn in_flight(&self) -> usize {
        let inner = self.inner.lock();
        self.capacity - inner.available.len() - inner.computed.len()
    }

    /// Consistent `(available, computed, in_flight)` snapshot under one
    /// acquisition of the render lock.
    pub fn counts(&self) -> (usize, usize, usize) {
        let inner = self.inner.lock();
        let in_flight = self.capacity - inner.available.len() - inner.computed.len();
        (inner.available.len(), inner.computed.len(), in_flight)
    }

    /// Refuse further lock requests and wake every waiter so the decoder
    /// and any blocked consumer observe the stop.
    pub(crate) fn begin_drain(&self) {
        self.inner.lock().draining = true;
        self.computed_ready.notify_all();
        self.slot_free.notify_all();
    }

    /// Accept lock requests again (clip re-initializing).
    pub(crate) fn end_drain(&self) {
        let mut inner = self.inner.lock();
        inner.draining = false;
        inner.expected_pts = None;
        inner.previous_pts = 0;
        inner.current_pts = 0;
    }

    /// Move every computed buffer back to the available queue. Used on
    /// stop, where queued PTS values are stale.
    pub(crate) fn flush_computed(&self) {
        self.flush_inner(None);
    }

    /// Flush for a resync: everything queued is stale, and deliveries are
    /// refused until one arrives at the seek target.
    pub(crate) fn flush_computed_expecting(&self, pts: i64) {
        self.flush_inner(Some(pts));
    }

    fn flush_inner(&self, expected_pts: Option<i64>) {
        let mut inner = self.inner.lock();
        while let Some(buf) = inner.computed.pop_front() {
            inner.available.push_back(buf);
        }
        inner.epoch = inner.epoch.wrapping_add(1);
        inner.expected_pts = expected_pts;
        inner.previous_pts = 0;
        inner.current_pts = 0;
        drop(inner);
        self.slot_free.notify_all();
    }

    /// Return a consumed buffer to the pool (Pop release policy).
    pub(crate) fn return_to_available(&self, buf: B) {
        self.inner.lock().available.push_back(buf);
        self.slot_free.notify_one();
    }

    /// Put a peeked buffer back where it was taken from (Get release
    /// policy), so repeated paused reads observe the same frame.
    pub(crate) fn restore_to_computed(&self, buf: B) {
        self.inner.lock().computed.push_back(buf);
        self.computed_ready.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(n: usize) -> BufferQueues<u32> {
        BufferQueues::new((0..n as u32).collect())
    }

    #[test]
    fn capacity_is_fixed_at_construction() {
        let q = pool(4);
        assert_eq!(q.capacity(), 4);
        assert_eq!(q.available_len(), 4);
        assert_eq!(q.computed_len(), 0);
        assert_eq!(q.in_flight(), 0);
    }

    #[test]
    fn flush_computed_conserves_buffers() {
        let q = pool(3);
        {
            let mut inner = q.inner.lock();
            let buf = inner.available.pop_front().unwrap();
            inner.computed.push_back(buf);
        }
        assert_eq!(q.computed_len(), 1);
        q.flush_computed();
        assert_eq!(q.computed_len(), 0);
        assert_eq!(q.available_len(), 3);
    }

    #[test]
    fn resync_flush_arms_the_pts_gate() {
        let q = pool(2);
        q.flush_computed_expecting(2000);
        assert_eq!(q.inner.lock().expected_pts, Some(2000));
        q.flush_computed();
        assert_eq!(q.inner.lock().expected_pts, None);
    }

    #[test]
    fn drain_flag_round_trip() {
        let q = pool(2);
        q.end_drain();
        assert!(!q.inner.lock().draining);
        q.begin_drain();
        assert!(q.inner.lock().draining);
    }
}
