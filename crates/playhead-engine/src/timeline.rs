//! Timeline driver boundary.
//!
//! Iterates every track for each output frame, takes the topmost non-null
//! video contribution, exposes audio contributions for mixing, and
//! substitutes an injected black frame / silence block for tracks with no
//! active clip. Effect application and final compositing are collaborators
//! operating on the returned buffers; they are not implemented here.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use playhead_core::{AudioBuffer, FrameKind, FrameRate, VideoBuffer};
use playhead_media::DecoderFactory;
use tracing::info;

use crate::stacked::StackedFrame;
use crate::track::TrackWorkflow;

/// Everything the timeline produced for one output frame.
pub struct TimelineOutput {
    video: Option<StackedFrame>,
    audio: Vec<StackedFrame>,
    blank: Arc<VideoBuffer>,
    /// True when every track reported its end.
    pub finished: bool,
}

impl TimelineOutput {
    /// The video frame to present: the topmost rendered clip frame, or the
    /// injected black frame when nothing rendered.
    pub fn video(&self) -> &VideoBuffer {
        self.video
            .as_ref()
            .and_then(|f| f.buffer().as_video())
            .unwrap_or(&self.blank)
    }

    /// Whether a clip (rather than the black fallback) produced the video.
    pub fn has_clip_video(&self) -> bool {
        self.video.is_some()
    }

    /// Mix every audio contribution into `out`. `out` is cleared first, so
    /// an empty contribution list yields silence.
    pub fn mix_audio(&self, out: &mut AudioBuffer) {
        out.clear();
        for stacked in &self.audio {
            if let Some(block) = stacked.buffer().as_audio() {
                out.mix_from(block);
            }
        }
    }

    /// Number of tracks that contributed audio.
    pub fn audio_track_count(&self) -> usize {
        self.audio.len()
    }
}

/// Owns the tracks and the fallback buffers, and drives per-frame output.
///
/// The black frame is constructed here and shared by reference; no
/// process-wide singletons.
pub struct Timeline {
    tracks: RwLock<Vec<Arc<TrackWorkflow>>>,
    factory: Arc<dyn DecoderFactory>,
    rate: FrameRate,
    blank: Arc<VideoBuffer>,
    current_frame: AtomicI64,
    paused: AtomicBool,
}

impl Timeline {
    /// Create an empty timeline rendering at the given output format.
    pub fn new(width: u32, height: u32, rate: FrameRate, factory: Arc<dyn DecoderFactory>) -> Self {
        Self {
            tracks: RwLock::new(Vec::new()),
            factory,
            rate,
            blank: Arc::new(VideoBuffer::black(width, height)),
            current_frame: AtomicI64::new(0),
            paused: AtomicBool::new(false),
        }
    }

    /// Output frame rate.
    pub fn frame_rate(&self) -> FrameRate {
        self.rate
    }

    /// Append a track. Tracks are composited top-down in insertion order.
    pub fn add_track(&self) -> Arc<TrackWorkflow> {
        let track = Arc::new(TrackWorkflow::new(Arc::clone(&self.factory)));
        self.tracks.write().push(Arc::clone(&track));
        track
    }

    /// Number of tracks.
    pub fn track_count(&self) -> usize {
        self.tracks.read().len()
    }

    /// Timeline length: the longest track's length.
    pub fn length(&self) -> i64 {
        self.tracks
            .read()
            .iter()
            .map(|t| t.get_length())
            .max()
            .unwrap_or(0)
    }

    /// Current playhead position.
    pub fn current_frame(&self) -> i64 {
        self.current_frame.load(Ordering::SeqCst)
    }

    /// Rewind and warm up every track for rendering from frame zero.
    pub fn start_render(&self) {
        self.current_frame.store(0, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        for track in self.tracks.read().iter() {
            track.start_render();
        }
        info!("timeline render started");
    }

    /// Render the current frame across all tracks, advancing the playhead
    /// when playing.
    pub fn next_frame(&self) -> TimelineOutput {
        let frame = self.current_frame.load(Ordering::SeqCst);
        let paused = self.paused.load(Ordering::SeqCst);
        let out = self.render_frame(frame, frame, paused);
        if !paused {
            self.current_frame.store(frame + 1, Ordering::SeqCst);
        }
        out
    }

    /// Render an arbitrary position without touching the playhead.
    pub fn render_frame(&self, current_frame: i64, sub_frame: i64, paused: bool) -> TimelineOutput {
        let tracks = self.tracks.read();
        let mut video = None;
        let mut audio = Vec::with_capacity(tracks.len());
        let mut finished = !tracks.is_empty();
        for track in tracks.iter() {
            let out = track.get_output(current_frame, sub_frame, paused);
            finished &= out.track_end;
            let Some(frame) = out.frame else { continue };
            match frame.buffer().kind() {
                FrameKind::Video => {
                    if video.is_none() {
                        video = Some(frame);
                    }
                    // Lower tracks are hidden by the topmost; releasing the
                    // token here returns the buffer to its clip's pool.
                }
                FrameKind::Audio => audio.push(frame),
            }
        }
        TimelineOutput {
            video,
            audio,
            blank: Arc::clone(&self.blank),
            finished,
        }
    }

    /// Move the playhead. Tracks detect the discontinuity on the next
    /// request and resync their active clips.
    pub fn seek(&self, frame: i64) {
        self.current_frame.store(frame.max(0), Ordering::SeqCst);
    }

    /// Pause playback across all tracks.
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            for track in self.tracks.read().iter() {
                track.pause();
            }
        }
    }

    /// Resume playback across all tracks.
    pub fn unpause(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            for track in self.tracks.read().iter() {
                track.unpause();
            }
        }
    }

    /// Whether playback is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Advance exactly one frame while paused.
    pub fn render_one_frame(&self) -> TimelineOutput {
        let frame = self.current_frame.fetch_add(1, Ordering::SeqCst) + 1;
        for track in self.tracks.read().iter() {
            track.render_one_frame();
        }
        self.render_frame(frame, frame, true)
    }

    /// Decouple every decoder from the wall clock (export path).
    pub fn set_full_speed_render(&self, enabled: bool) {
        for track in self.tracks.read().iter() {
            track.set_full_speed_render(enabled);
        }
    }

    /// Stop and clear every track.
    pub fn clear(&self) {
        for track in self.tracks.read().iter() {
            track.clear();
        }
        self.tracks.write().clear();
    }
}
