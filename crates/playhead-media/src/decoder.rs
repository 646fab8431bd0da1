//! Decoder control contract and the typed frame-delivery callbacks.
//!
//! The engine drives a decoder but never implements decoding itself. A
//! decoder runs its own delivery thread and hands frames back through a
//! [`FrameSink`], the pair of callbacks bridging the decoder thread and the
//! consumer thread. Both callbacks must complete in bounded time and must
//! not allocate.

use std::sync::Arc;

use playhead_core::{Frame, Result};

use crate::probe::MediaSource;

/// One frame buffer on loan to the decoder.
///
/// Created by [`FrameSink::on_frame_lock_requested`] from a buffer taken off
/// the clip's available queue; the decoder fills the payload in place and
/// returns the lease via [`FrameSink::on_frame_filled`]. The lease owns the
/// buffer while the decoder writes, so the buffer is accounted for at every
/// instant: it is either pooled, computed, leased, or handed to a consumer.
pub struct FrameLease {
    frame: Frame,
    token: u64,
}

impl FrameLease {
    /// Wrap a buffer for the decoder to fill.
    pub fn new(frame: Frame) -> Self {
        Self { frame, token: 0 }
    }

    /// Wrap a buffer, stamped with an opaque sink token. The sink uses the
    /// token to recognize deliveries that started before a flush and are
    /// stale by the time they complete.
    pub fn with_token(frame: Frame, token: u64) -> Self {
        Self { frame, token }
    }

    /// The sink token this lease was created with.
    #[inline]
    pub fn token(&self) -> u64 {
        self.token
    }

    /// The payload to fill.
    #[inline]
    pub fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }

    /// Give the filled buffer back to its owner.
    #[inline]
    pub fn into_frame(self) -> Frame {
        self.frame
    }
}

/// Frame-delivery callbacks, implemented by each clip workflow.
///
/// Replaces the untyped lock/unlock function-pointer pair a native decoder
/// would expose: the decoder holds an interface reference instead.
pub trait FrameSink: Send + Sync {
    /// The decoder wants a buffer to fill.
    ///
    /// Blocks while the pool is exhausted (backpressure on the decoder) and
    /// returns `None` once the clip is stopping, at which point the decoder
    /// must stop delivering.
    fn on_frame_lock_requested(&self) -> Option<FrameLease>;

    /// The decoder finished filling a leased buffer.
    ///
    /// `pts` is the decoder's presentation timestamp for the frame, in
    /// milliseconds. The sink stamps PTS drift, queues the frame for
    /// consumption, and wakes any waiting consumer.
    fn on_frame_filled(&self, lease: FrameLease, pts: i64);
}

/// Control surface of a media decoder.
///
/// `initialize` is asynchronous: it arms the decoder's delivery thread and
/// returns immediately. `wait_for_complete_init` blocks (bounded by the
/// implementation) until the media is open, reporting success.
pub trait Decoder: Send {
    /// Start opening the media; frames flow to `sink` once playing.
    fn initialize(&mut self, sink: Arc<dyn FrameSink>);

    /// Block until initialization completes. `false` means the media could
    /// not be opened and the clip must go to its error state.
    fn wait_for_complete_init(&mut self) -> bool;

    /// Begin or resume frame delivery.
    fn play(&mut self);

    /// Suspend frame delivery without releasing the media.
    fn pause(&mut self);

    /// Release the media and terminate the delivery thread.
    fn stop(&mut self);

    /// Seek the decoder clock to an absolute source position.
    fn set_time(&mut self, ms: i64);

    /// Whether the decoder delivered the last frame of the source.
    fn is_end_reached(&self) -> bool;

    /// Decouple delivery from the wall clock (export path). Realtime
    /// decoders pace themselves to the frame rate unless this is set.
    fn set_full_speed(&mut self, enabled: bool);
}

/// Opens a decoder for a media source. Injected into each track so clip
/// workflows never name a concrete decoder type.
pub trait DecoderFactory: Send + Sync {
    fn open(&self, source: &MediaSource) -> Result<Box<dyn Decoder>>;
}
