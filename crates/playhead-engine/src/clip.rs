//! Clip workflow: the per-clip state machine wrapping one decoder.
//!
//! Two locks per clip, deliberately separate and never held together:
//! - the state lock (`RwLock<ClipState>`), read concurrently by every
//!   scheduler scan, written on transitions;
//! - the render lock inside [`BufferQueues`], guarding only the
//!   available/computed hand-off between the decoder's delivery thread and
//!   the consumer.
//!
//! A slow state check can therefore never stall the realtime decode
//! callback, and vice versa.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use playhead_core::pipeline::POOL_DEPTH;
use playhead_core::{AudioBuffer, Frame, VideoBuffer};
use playhead_media::{Decoder, FrameLease, FrameSink, MediaSource, SourceKind};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::pool::BufferQueues;
use crate::stacked::{ReleasePolicy, StackedBuffer, StackedFrame};

/// Upper bound on a consumer's wait for a computed frame. Generous; in
/// practice the wait is bounded by decoder throughput.
const OUTPUT_WAIT: Duration = Duration::from_secs(2);
/// Poll slice while waiting, so end-of-stream is observed promptly.
const OUTPUT_POLL: Duration = Duration::from_millis(20);

/// Placement record for a clip instance: trim boundaries into the source
/// media plus the identities the persisted form carries.
#[derive(Debug, Clone)]
pub struct ClipHelper {
    /// Identity of this placement record.
    pub uuid: Uuid,
    /// Identity of the clip itself.
    pub clip_uuid: Uuid,
    /// The underlying media.
    pub source: MediaSource,
    /// First source frame this clip plays.
    pub trim_begin: i64,
    /// One past the last source frame this clip plays.
    pub trim_end: i64,
}

impl ClipHelper {
    /// Place a clip over `[trim_begin, trim_end)` of `source`.
    pub fn new(source: MediaSource, trim_begin: i64, trim_end: i64) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            clip_uuid: Uuid::new_v4(),
            source,
            trim_begin,
            trim_end,
        }
    }

    /// Rebuild a placement record with persisted identities.
    pub fn with_ids(
        source: MediaSource,
        trim_begin: i64,
        trim_end: i64,
        clip_uuid: Uuid,
        helper_uuid: Uuid,
    ) -> Self {
        Self {
            uuid: helper_uuid,
            clip_uuid,
            source,
            trim_begin,
            trim_end,
        }
    }

    /// Clip length in frames.
    pub fn length(&self) -> i64 {
        self.trim_end - self.trim_begin
    }
}

/// Clip workflow states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipState {
    Stopped,
    Initializing,
    Ready,
    Rendering,
    Paused,
    PauseRequired,
    UnpauseRequired,
    EndReached,
    Muted,
    Error,
}

/// How `get_output` hands the buffer over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetMode {
    /// Dequeue the oldest computed buffer; releasing returns it to the
    /// pool. Normal forward playback and frame-stepping.
    Pop,
    /// Take the most recent computed buffer; releasing puts it back, so
    /// repeated paused reads show the same still frame without consuming
    /// pool capacity.
    Get,
}

/// One clip's producer/consumer pipeline around one decoder instance.
///
/// Video, still-image and audio sources share this state machine; the
/// source kind only selects the buffer shape the pool is built from and how
/// the decoder produces a frame.
pub struct ClipWorkflow {
    helper: ClipHelper,
    state: RwLock<ClipState>,
    queues: Arc<BufferQueues<Frame>>,
    decoder: Mutex<Box<dyn Decoder>>,
    resync_required: AtomicBool,
}

impl ClipWorkflow {
    /// Build a workflow for a placed clip. The buffer pool is allocated
    /// here, once; nothing allocates afterwards.
    pub fn new(helper: ClipHelper, decoder: Box<dyn Decoder>) -> Arc<Self> {
        let buffers = (0..POOL_DEPTH)
            .map(|_| match helper.source.kind {
                SourceKind::Video | SourceKind::Image => {
                    Frame::Video(VideoBuffer::new(helper.source.width, helper.source.height))
                }
                SourceKind::Audio => Frame::Audio(AudioBuffer::new(
                    helper.source.channels,
                    helper.source.samples_per_block(),
                )),
            })
            .collect();
        Arc::new(Self {
            helper,
            state: RwLock::new(ClipState::Stopped),
            queues: Arc::new(BufferQueues::new(buffers)),
            decoder: Mutex::new(decoder),
            resync_required: AtomicBool::new(false),
        })
    }

    /// Placement record.
    pub fn helper(&self) -> &ClipHelper {
        &self.helper
    }

    /// Clip identity, as used by track-level operations.
    pub fn clip_uuid(&self) -> Uuid {
        self.helper.clip_uuid
    }

    /// Clip length in frames.
    pub fn length(&self) -> i64 {
        self.helper.length()
    }

    /// Current state. Cheap; many scheduler passes read it concurrently.
    pub fn state(&self) -> ClipState {
        *self.state.read()
    }

    /// The clip's queue pair, exposed for conservation checks.
    pub fn queues(&self) -> &Arc<BufferQueues<Frame>> {
        &self.queues
    }

    fn set_state(&self, next: ClipState) {
        let mut state = self.state.write();
        trace!(clip = %self.helper.clip_uuid, from = ?*state, to = ?next, "clip state");
        *state = next;
    }

    /// Start opening the decoder. Asynchronous: the clip is `Ready` only
    /// after [`wait_for_ready`](Self::wait_for_ready) confirms it.
    pub fn initialize(&self) {
        {
            let mut state = self.state.write();
            match *state {
                ClipState::Stopped => *state = ClipState::Initializing,
                ClipState::Initializing => return,
                other => {
                    warn!(clip = %self.helper.clip_uuid, state = ?other, "initialize ignored");
                    return;
                }
            }
        }
        self.queues.end_drain();
        let sink: Arc<dyn FrameSink> = Arc::new(ClipSink {
            clip_uuid: self.helper.clip_uuid,
            queues: Arc::clone(&self.queues),
        });
        self.decoder.lock().initialize(sink);
        debug!(clip = %self.helper.clip_uuid, "clip initializing");
    }

    /// Block (bounded by the decoder) until initialization completes.
    /// A failed open transitions the clip to `Error`; the track keeps
    /// playing without it.
    pub fn wait_for_ready(&self) -> bool {
        match self.state() {
            ClipState::Ready | ClipState::Rendering | ClipState::Paused => true,
            ClipState::Initializing => {
                let ok = self.decoder.lock().wait_for_complete_init();
                if ok {
                    self.set_state(ClipState::Ready);
                } else {
                    warn!(clip = %self.helper.clip_uuid, media = %self.helper.source.path,
                          "decoder failed to open media");
                    self.set_state(ClipState::Error);
                }
                ok
            }
            _ => false,
        }
    }

    /// Begin frame delivery. Valid from `Ready`.
    pub fn start_render(&self) {
        if self.state() != ClipState::Ready {
            return;
        }
        self.decoder.lock().play();
        self.set_state(ClipState::Rendering);
    }

    /// Enter `Paused` without ever playing. Used when a clip is brought up
    /// while the timeline is paused: the seek already delivered the target
    /// frame, the decoder must not free-run.
    pub fn begin_paused(&self) {
        if self.state() == ClipState::Ready {
            self.set_state(ClipState::Paused);
        }
    }

    /// Two-phase pause: `Rendering -> PauseRequired -> Paused`.
    pub fn pause(&self) {
        if self.state() != ClipState::Rendering {
            return;
        }
        self.set_state(ClipState::PauseRequired);
        self.decoder.lock().pause();
        self.set_state(ClipState::Paused);
    }

    /// Two-phase resume: `Paused -> UnpauseRequired -> Rendering`.
    pub fn unpause(&self) {
        if self.state() != ClipState::Paused {
            return;
        }
        self.set_state(ClipState::UnpauseRequired);
        self.decoder.lock().play();
        self.set_state(ClipState::Rendering);
    }

    /// Mute: the track treats this clip as absent but keeps its slot. The
    /// decoder is not touched.
    pub fn mute(&self) {
        self.set_state(ClipState::Muted);
    }

    /// Unmute back to `Stopped`; the scheduler re-initializes on demand.
    pub fn unmute(&self) {
        if self.state() == ClipState::Muted {
            self.set_state(ClipState::Stopped);
        }
    }

    /// Stop from any state: refuse further decoder deliveries, release the
    /// decoder, drain queued buffers back to the pool. Safe to call
    /// concurrently with an in-flight lock/unlock pair.
    pub fn stop(&self) {
        if self.state() == ClipState::Stopped {
            return;
        }
        self.set_state(ClipState::Stopped);
        // Draining first: a delivery blocked on pool capacity wakes, sees
        // the flag and backs out, so the decoder join below cannot hang.
        self.queues.begin_drain();
        self.decoder.lock().stop();
        self.queues.flush_computed();
        debug!(clip = %self.helper.clip_uuid, "clip stopped");
    }

    /// Mark that the decoder clock must be realigned before the next
    /// `get_output` (clip moved, playhead jumped).
    pub fn require_resync(&self) {
        self.resync_required.store(true, Ordering::SeqCst);
    }

    /// Whether a resync is pending.
    pub fn resync_required(&self) -> bool {
        self.resync_required.load(Ordering::SeqCst)
    }

    pub(crate) fn take_resync(&self) -> bool {
        self.resync_required.swap(false, Ordering::SeqCst)
    }

    /// Realign the decoder clock for `current_frame` on a track where this
    /// clip starts at `track_start`, and flush stale computed frames.
    ///
    /// Delivery is suspended around the flush+seek, and the sink refuses
    /// every delivery until one arrives at the seek target: a frame leased
    /// before the flush carries a stale epoch, and a frame leased after it
    /// but filled from the pre-seek clock carries the wrong PTS.
    pub fn set_time(&self, current_frame: i64, track_start: i64) {
        let source_frame = self.helper.trim_begin + (current_frame - track_start);
        let target_ms = self.helper.source.frame_rate.frame_to_ms(source_frame);
        let was_rendering = self.state() == ClipState::Rendering;
        let mut decoder = self.decoder.lock();
        if was_rendering {
            decoder.pause();
        }
        self.queues.flush_computed_expecting(target_ms);
        decoder.set_time(target_ms);
        if was_rendering {
            decoder.play();
        }
        drop(decoder);
        self.resync_required.store(false, Ordering::SeqCst);
        debug!(clip = %self.helper.clip_uuid, current_frame, target_ms, "clip resynced");
    }

    /// Decouple the decoder from the wall clock (export path).
    pub fn set_full_speed_render(&self, enabled: bool) {
        self.decoder.lock().set_full_speed(enabled);
    }

    /// Fetch one frame of output.
    ///
    /// Precondition (enforced by the track scheduler): the clip is in a
    /// rendering-capable state. Blocks until the decoder has computed at
    /// least one buffer; returns `None` once end-of-stream is reached and
    /// every computed frame has been consumed.
    pub fn get_output(&self, mode: GetMode) -> Option<StackedFrame> {
        if !self.pre_get_output() {
            return None;
        }
        let mut inner = self.queues.inner.lock();
        let (frame, policy) = match mode {
            GetMode::Pop => (inner.computed.pop_front()?, ReleasePolicy::ReturnToPool),
            GetMode::Get => (inner.computed.pop_back()?, ReleasePolicy::LeaveInPlace),
        };
        drop(inner);
        trace!(clip = %self.helper.clip_uuid, ?mode, pts = frame.pts(), "output frame");
        Some(StackedBuffer::new(frame, Arc::clone(&self.queues), policy))
    }

    /// Pre-get hook: wait until a computed buffer exists, the clip stops,
    /// or the decoder reports end-of-stream with nothing left to drain.
    fn pre_get_output(&self) -> bool {
        let mut waited = Duration::ZERO;
        loop {
            {
                let mut inner = self.queues.inner.lock();
                if !inner.computed.is_empty() {
                    return true;
                }
                if inner.draining {
                    return false;
                }
                self.queues.computed_ready.wait_for(&mut inner, OUTPUT_POLL);
                if !inner.computed.is_empty() {
                    return true;
                }
                if inner.draining {
                    return false;
                }
            }
            // Render lock dropped: end-of-stream check goes through the
            // decoder handle, which must not nest inside the render lock.
            if self.decoder.lock().is_end_reached() {
                self.set_state(ClipState::EndReached);
                return false;
            }
            waited += OUTPUT_POLL;
            if waited >= OUTPUT_WAIT {
                warn!(clip = %self.helper.clip_uuid, "timed out waiting for a computed frame");
                return false;
            }
        }
    }
}

/// Decoder-side callback target for one clip. Holds only what the delivery
/// thread needs, so the decoder never keeps the whole workflow alive.
struct ClipSink {
    clip_uuid: Uuid,
    queues: Arc<BufferQueues<Frame>>,
}

/// Decoder-side callbacks. Driven by the decoder's delivery thread, never
/// by the consumer; this pair is the sole concurrency bridge between the
/// two. Neither callback allocates or blocks beyond pool backpressure.
impl FrameSink for ClipSink {
    fn on_frame_lock_requested(&self) -> Option<FrameLease> {
        let mut inner = self.queues.inner.lock();
        while inner.available.is_empty() && !inner.draining {
            // Pool exhausted: throttle the decoder until the consumer
            // releases a buffer.
            self.queues.slot_free.wait(&mut inner);
        }
        if inner.draining {
            return None;
        }
        let epoch = inner.epoch;
        let frame = inner.available.pop_front()?;
        Some(FrameLease::with_token(frame, epoch))
    }

    fn on_frame_filled(&self, lease: FrameLease, pts: i64) {
        let mut inner = self.queues.inner.lock();
        let stale = inner.draining
            || lease.token() != inner.epoch
            || inner.expected_pts.is_some_and(|expected| pts != expected);
        if stale {
            // Stop or a resync raced with this delivery; the frame was
            // filled against a stale clock.
            let frame = lease.into_frame();
            inner.available.push_back(frame);
            drop(inner);
            self.queues.slot_free.notify_one();
            return;
        }
        inner.expected_pts = None;
        let mut frame = lease.into_frame();
        inner.previous_pts = inner.current_pts;
        inner.current_pts = pts;
        let diff = inner.current_pts - inner.previous_pts;
        frame.set_pts(pts, diff);
        inner.computed.push_back(frame);
        drop(inner);
        self.queues.computed_ready.notify_one();
        trace!(clip = %self.clip_uuid, pts, diff, "frame computed");
    }
}
