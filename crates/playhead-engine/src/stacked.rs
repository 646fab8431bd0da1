//! One-shot ownership token for a frame buffer.
//!
//! A `StackedBuffer` is handed to the caller of `get_output` and carries the
//! buffer plus its release policy. Release happens exactly once: either
//! explicitly through [`StackedBuffer::release`] or in `Drop`. Move
//! semantics make double-release unrepresentable, which is what keeps the
//! pool conservation invariant intact.

use std::sync::Arc;

use playhead_core::Frame;

use crate::pool::BufferQueues;

/// What releasing the token does with the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleasePolicy {
    /// Return the buffer to the available pool (Pop mode: the frame has
    /// been consumed).
    ReturnToPool,
    /// Put the buffer back onto the computed queue (Get mode: the frame is
    /// only being viewed and must remain readable).
    LeaveInPlace,
}

/// Move-only handle on one buffer taken from a clip's queues.
pub struct StackedBuffer<B> {
    buf: Option<B>,
    home: Arc<BufferQueues<B>>,
    policy: ReleasePolicy,
}

/// The token type clip and track workflows trade in.
pub type StackedFrame = StackedBuffer<Frame>;

impl<B> StackedBuffer<B> {
    pub(crate) fn new(buf: B, home: Arc<BufferQueues<B>>, policy: ReleasePolicy) -> Self {
        Self {
            buf: Some(buf),
            home,
            policy,
        }
    }

    /// The wrapped buffer.
    #[inline]
    pub fn buffer(&self) -> &B {
        // Invariant: `buf` is only None after release, and release consumes
        // the token.
        self.buf.as_ref().expect("released StackedBuffer")
    }

    /// The release policy this token carries.
    pub fn policy(&self) -> ReleasePolicy {
        self.policy
    }

    /// Release the buffer according to its policy. Dropping the token does
    /// the same; this form just makes hand-off points explicit.
    pub fn release(self) {}
}

impl<B> Drop for StackedBuffer<B> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            match self.policy {
                ReleasePolicy::ReturnToPool => self.home.return_to_available(buf),
                ReleasePolicy::LeaveInPlace => self.home.restore_to_computed(buf),
            }
        }
    }
}
