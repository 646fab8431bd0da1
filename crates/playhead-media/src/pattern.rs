//! Built-in threaded decoder producing deterministic test content.
//!
//! `PatternDecoder` implements the full [`Decoder`] contract with its own
//! delivery thread: color-bars frames for video sources, a re-delivered
//! still for images, and a ramp waveform for audio. It is the decoder the
//! engine tests against and the fallback when no native decoder is wired in.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use playhead_core::{Frame, Result};
use tracing::{debug, info, warn};

use crate::decoder::{Decoder, DecoderFactory, FrameSink};
use crate::probe::{MediaSource, SourceKind};

enum Command {
    Play,
    Pause,
    Seek(i64),
    Stop,
}

struct Shared {
    playing: AtomicBool,
    end: AtomicBool,
    full_speed: AtomicBool,
    position_ms: AtomicI64,
}

/// Threaded test-pattern decoder.
pub struct PatternDecoder {
    source: MediaSource,
    shared: Arc<Shared>,
    fail_init: bool,
    initialized: bool,
    cmd_tx: Option<Sender<Command>>,
    ready_rx: Option<Receiver<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl PatternDecoder {
    /// Create a decoder for the given source. Delivery starts on
    /// `initialize`, not here.
    pub fn new(source: MediaSource, realtime: bool) -> Self {
        Self {
            source,
            shared: Arc::new(Shared {
                playing: AtomicBool::new(false),
                end: AtomicBool::new(false),
                full_speed: AtomicBool::new(!realtime),
                position_ms: AtomicI64::new(0),
            }),
            fail_init: false,
            initialized: false,
            cmd_tx: None,
            ready_rx: None,
            handle: None,
        }
    }

    /// A decoder whose initialization always reports failure.
    pub fn failing(source: MediaSource) -> Self {
        let mut decoder = Self::new(source, false);
        decoder.fail_init = true;
        decoder
    }
}

impl Decoder for PatternDecoder {
    fn initialize(&mut self, sink: Arc<dyn FrameSink>) {
        if self.handle.is_some() {
            warn!(path = %self.source.path, "decoder already initialized");
            return;
        }
        let (cmd_tx, cmd_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);
        self.cmd_tx = Some(cmd_tx);
        self.ready_rx = Some(ready_rx);
        self.initialized = false;
        self.shared.playing.store(false, Ordering::SeqCst);
        self.shared.end.store(false, Ordering::SeqCst);
        self.shared.position_ms.store(0, Ordering::SeqCst);

        let source = self.source.clone();
        let shared = Arc::clone(&self.shared);
        let fail = self.fail_init;
        self.handle = Some(std::thread::spawn(move || {
            if fail {
                let _ = ready_tx.send(false);
                return;
            }
            let _ = ready_tx.send(true);
            delivery_loop(&source, &shared, sink, cmd_rx);
        }));
        debug!(path = %self.source.path, "pattern decoder armed");
    }

    fn wait_for_complete_init(&mut self) -> bool {
        if self.initialized {
            return true;
        }
        let Some(ready_rx) = self.ready_rx.take() else {
            return false;
        };
        match ready_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(true) => {
                self.initialized = true;
                true
            }
            Ok(false) => {
                warn!(path = %self.source.path, "media could not be opened");
                false
            }
            Err(_) => {
                warn!(path = %self.source.path, "decoder initialization timed out");
                false
            }
        }
    }

    fn play(&mut self) {
        self.shared.playing.store(true, Ordering::SeqCst);
        if let Some(tx) = &self.cmd_tx {
            let _ = tx.send(Command::Play);
        }
    }

    fn pause(&mut self) {
        self.shared.playing.store(false, Ordering::SeqCst);
        if let Some(tx) = &self.cmd_tx {
            let _ = tx.send(Command::Pause);
        }
    }

    fn stop(&mut self) {
        self.shared.playing.store(false, Ordering::SeqCst);
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(Command::Stop);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.ready_rx = None;
        self.initialized = false;
        info!(path = %self.source.path, "pattern decoder stopped");
    }

    fn set_time(&mut self, ms: i64) {
        self.shared.position_ms.store(ms, Ordering::SeqCst);
        self.shared.end.store(false, Ordering::SeqCst);
        if let Some(tx) = &self.cmd_tx {
            let _ = tx.send(Command::Seek(ms));
        }
        debug!(path = %self.source.path, ms, "decoder seek");
    }

    fn is_end_reached(&self) -> bool {
        self.shared.end.load(Ordering::SeqCst)
    }

    fn set_full_speed(&mut self, enabled: bool) {
        self.shared.full_speed.store(enabled, Ordering::SeqCst);
    }
}

impl Drop for PatternDecoder {
    fn drop(&mut self) {
        // The owning clip workflow stops before dropping; this only covers
        // a decoder that was never handed to a clip.
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(Command::Stop);
        }
    }
}

fn delivery_loop(
    source: &MediaSource,
    shared: &Shared,
    sink: Arc<dyn FrameSink>,
    cmd_rx: Receiver<Command>,
) {
    let frame_ms = source.frame_rate.frame_duration_ms().max(1);
    loop {
        let cmd = if shared.playing.load(Ordering::SeqCst) {
            cmd_rx.try_recv().ok()
        } else {
            match cmd_rx.recv() {
                Ok(cmd) => Some(cmd),
                Err(_) => return,
            }
        };
        if let Some(cmd) = cmd {
            match cmd {
                Command::Stop => return,
                Command::Play => shared.playing.store(true, Ordering::SeqCst),
                Command::Pause => shared.playing.store(false, Ordering::SeqCst),
                Command::Seek(ms) => {
                    shared.end.store(false, Ordering::SeqCst);
                    // `set_time` already moved the clock. Deliver the frame
                    // under the new position (so a paused scrub shows the
                    // target) unless a delivery that raced the seek has
                    // already consumed it.
                    if shared.position_ms.load(Ordering::SeqCst) == ms
                        && !deliver_one(source, shared, &sink, frame_ms)
                    {
                        return;
                    }
                }
            }
            continue;
        }
        if !shared.playing.load(Ordering::SeqCst) {
            continue;
        }
        let pos = shared.position_ms.load(Ordering::SeqCst);
        if pos >= source.duration_ms() {
            shared.end.store(true, Ordering::SeqCst);
            shared.playing.store(false, Ordering::SeqCst);
            debug!(path = %source.path, pos, "end of source reached");
            continue;
        }
        if !deliver_one(source, shared, &sink, frame_ms) {
            return;
        }
        if !shared.full_speed.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(frame_ms as u64));
        }
    }
}

/// Fill and hand over one frame. Returns `false` when the sink refused the
/// lock request, which means the clip is stopping.
fn deliver_one(
    source: &MediaSource,
    shared: &Shared,
    sink: &Arc<dyn FrameSink>,
    frame_ms: i64,
) -> bool {
    let Some(mut lease) = sink.on_frame_lock_requested() else {
        return false;
    };
    // Read the clock only after the lease. The lock request blocks under
    // pool backpressure, and a seek can land during that wait; a position
    // captured before it would fill this frame against the old clock.
    let pos = shared.position_ms.load(Ordering::SeqCst);
    fill_frame(lease.frame_mut(), source, pos);
    sink.on_frame_filled(lease, pos);
    // Advance only if no seek moved the clock while this frame was being
    // filled; a plain store here would clobber the seek target.
    let _ = shared.position_ms.compare_exchange(
        pos,
        pos + frame_ms,
        Ordering::SeqCst,
        Ordering::SeqCst,
    );
    true
}

fn fill_frame(frame: &mut Frame, source: &MediaSource, pos_ms: i64) {
    let frame_index = source.frame_rate.ms_to_frame(pos_ms);
    match (source.kind, frame) {
        (SourceKind::Video, Frame::Video(buf)) => {
            buf.fill_test_pattern(frame_index as u32);
        }
        (SourceKind::Image, Frame::Video(buf)) => {
            // Stills ignore the position: every delivery is the same image.
            buf.fill_test_pattern(0);
        }
        (SourceKind::Audio, Frame::Audio(buf)) => {
            let base = frame_index as i16;
            for (i, sample) in buf.samples_mut().iter_mut().enumerate() {
                *sample = base.wrapping_add((i % 64) as i16);
            }
        }
        (kind, frame) => {
            warn!(?kind, frame_kind = ?frame.kind(), "buffer shape does not match source");
        }
    }
}

/// Factory producing [`PatternDecoder`]s.
pub struct PatternDecoderFactory {
    realtime: bool,
    fail_init: bool,
}

impl PatternDecoderFactory {
    /// Decoders run unthrottled (tests, export).
    pub fn new() -> Self {
        Self {
            realtime: false,
            fail_init: false,
        }
    }

    /// Decoders pace delivery to the source frame rate.
    pub fn realtime() -> Self {
        Self {
            realtime: true,
            fail_init: false,
        }
    }

    /// Every decoder fails to initialize. Test hook for the clip error path.
    pub fn failing() -> Self {
        Self {
            realtime: false,
            fail_init: true,
        }
    }
}

impl Default for PatternDecoderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderFactory for PatternDecoderFactory {
    fn open(&self, source: &MediaSource) -> Result<Box<dyn Decoder>> {
        let decoder = if self.fail_init {
            PatternDecoder::failing(source.clone())
        } else {
            PatternDecoder::new(source.clone(), self.realtime)
        };
        Ok(Box::new(decoder))
    }
}
