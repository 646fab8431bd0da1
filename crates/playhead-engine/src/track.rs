//! Track workflow: per-track scheduling of clip workflows.
//!
//! Clips live in an ordered map keyed by their start frame; key order is
//! playback order. For every requested frame the scheduler classifies each
//! clip as active, preloading, or stoppable, and drives the matching clip
//! workflow transitions.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use playhead_core::pipeline::PRELOAD_WINDOW;
use playhead_core::{EngineError, Result};
use playhead_media::DecoderFactory;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clip::{ClipHelper, ClipState, ClipWorkflow, GetMode};
use crate::stacked::StackedFrame;

/// What one track contributes for one requested frame.
pub struct TrackOutput {
    /// The active clip's frame, if any clip rendered.
    pub frame: Option<StackedFrame>,
    /// True when the chronologically last clip can no longer render: its
    /// interval ends before the requested frame, or it is in error.
    pub track_end: bool,
}

struct TrackClips {
    map: BTreeMap<i64, Arc<ClipWorkflow>>,
    /// Derived: max(start + length) over all clips. Recomputed under this
    /// same lock on every structural mutation.
    length: i64,
}

impl TrackClips {
    fn recompute_length(&mut self) {
        self.length = self
            .map
            .iter()
            .map(|(start, cw)| start + cw.length())
            .max()
            .unwrap_or(0);
    }

    fn find(&self, clip_uuid: Uuid) -> Option<(i64, Arc<ClipWorkflow>)> {
        self.map
            .iter()
            .find(|(_, cw)| cw.clip_uuid() == clip_uuid)
            .map(|(start, cw)| (*start, Arc::clone(cw)))
    }
}

/// Per-render-pass bookkeeping, touched only by the render thread.
struct RenderPass {
    last_frame: i64,
    render_one_frame: bool,
}

/// Ordered collection of clips on one track, plus the scheduling logic
/// that decides which clip renders a given frame.
pub struct TrackWorkflow {
    id: Uuid,
    clips: RwLock<TrackClips>,
    pass: Mutex<RenderPass>,
    factory: Arc<dyn DecoderFactory>,
}

impl TrackWorkflow {
    /// Create an empty track. The factory opens a decoder per added clip.
    pub fn new(factory: Arc<dyn DecoderFactory>) -> Self {
        Self {
            id: Uuid::new_v4(),
            clips: RwLock::new(TrackClips {
                map: BTreeMap::new(),
                length: 0,
            }),
            pass: Mutex::new(RenderPass {
                last_frame: 0,
                render_one_frame: false,
            }),
            factory: Arc::clone(&factory),
        }
    }

    /// Track identity.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Insert a clip starting at `start_frame`. Returns the clip's uuid.
    pub fn add_clip(&self, helper: ClipHelper, start_frame: i64) -> Result<Uuid> {
        let decoder = self.factory.open(&helper.source)?;
        let clip_uuid = helper.clip_uuid;
        let mut clips = self.clips.write();
        if clips.map.contains_key(&start_frame) {
            return Err(EngineError::InvalidParameter(format!(
                "track {} already has a clip starting at frame {start_frame}",
                self.id
            )));
        }
        info!(track = %self.id, clip = %clip_uuid, start_frame, "inserting clip");
        clips.map.insert(start_frame, ClipWorkflow::new(helper, decoder));
        clips.recompute_length();
        Ok(clip_uuid)
    }

    /// The central per-frame scheduling decision.
    ///
    /// Classifies every clip by interval membership: the clip whose
    /// `[start, start + length)` contains `current_frame` renders; clips
    /// starting within the preload window ahead are initialized early;
    /// everything else is stopped. At most one clip may be active — a
    /// second match is a track-authoring error, logged, first match wins.
    pub fn get_output(&self, current_frame: i64, sub_frame: i64, paused: bool) -> TrackOutput {
        let mut pass = self.pass.lock();
        let one_frame = std::mem::take(&mut pass.render_one_frame);
        // A paused scrub or a jump of more than one frame means the active
        // clip's decoder clock no longer matches the requested position.
        let need_repositioning = (paused && sub_frame != pass.last_frame)
            || (sub_frame - pass.last_frame).abs() > 1;

        let clips = self.clips.read();
        let mut frame = None;
        let track_end = match clips.map.iter().next_back() {
            Some((start, cw)) => {
                start + cw.length() <= current_frame || cw.state() == ClipState::Error
            }
            None => true,
        };

        for (&start, cw) in clips.map.iter() {
            let end = start + cw.length();
            if start <= current_frame && current_frame < end {
                if frame.is_some() {
                    // Track-authoring invariant violation, not schedulable.
                    warn!(track = %self.id, clip = %cw.clip_uuid(), current_frame,
                          "more than one clip to render here; first match wins");
                    continue;
                }
                frame = self.render_clip(cw, current_frame, start, need_repositioning, one_frame, paused);
            } else if current_frame < start && start < current_frame + PRELOAD_WINDOW {
                Self::preload_clip(cw);
            } else {
                Self::stop_clip_workflow(cw);
            }
        }
        pass.last_frame = sub_frame;
        TrackOutput { frame, track_end }
    }

    /// Drive one clip to produce output, dispatching on its state.
    fn render_clip(
        &self,
        cw: &Arc<ClipWorkflow>,
        current_frame: i64,
        start: i64,
        need_repositioning: bool,
        one_frame: bool,
        paused: bool,
    ) -> Option<StackedFrame> {
        // Repositioned output must come from a fresh decode, never from a
        // stale peek; so does normal playback and a frame-step.
        let mode = if !paused || one_frame || need_repositioning {
            GetMode::Pop
        } else {
            GetMode::Get
        };
        match cw.state() {
            ClipState::Rendering
            | ClipState::Paused
            | ClipState::PauseRequired
            | ClipState::UnpauseRequired => {
                if cw.take_resync() || need_repositioning {
                    cw.set_time(current_frame, start);
                }
                cw.get_output(mode)
            }
            ClipState::Stopped | ClipState::Initializing | ClipState::Ready => {
                if cw.state() == ClipState::Stopped {
                    cw.initialize();
                }
                if !cw.wait_for_ready() {
                    warn!(track = %self.id, clip = %cw.clip_uuid(),
                          "clip failed to become ready; track continues without it");
                    return None;
                }
                let needs_seek = cw.take_resync()
                    || cw.helper().trim_begin != 0
                    || (current_frame - start).abs() > 1;
                if paused {
                    // Brought up mid-pause (a scrub landed on this clip):
                    // the seek delivers the target frame, the decoder must
                    // not free-run.
                    cw.set_time(current_frame, start);
                    cw.begin_paused();
                    cw.get_output(GetMode::Pop)
                } else {
                    if needs_seek {
                        cw.set_time(current_frame, start);
                    }
                    cw.start_render();
                    cw.get_output(mode)
                }
            }
            ClipState::EndReached | ClipState::Muted | ClipState::Error => None,
        }
    }

    /// Initialize a clip ahead of its turn so it is `Ready` on time.
    fn preload_clip(cw: &Arc<ClipWorkflow>) {
        if cw.state() == ClipState::Stopped {
            debug!(clip = %cw.clip_uuid(), "preloading clip");
            cw.initialize();
        }
    }

    /// Idempotent stop: a no-op for clips already Stopped, Muted, or in
    /// error.
    fn stop_clip_workflow(cw: &Arc<ClipWorkflow>) {
        match cw.state() {
            ClipState::Stopped | ClipState::Muted | ClipState::Error => {}
            _ => cw.stop(),
        }
    }

    /// Move a clip to a new start frame. The clip keeps its decoder but
    /// must resync before it renders again.
    pub fn move_clip(&self, clip_uuid: Uuid, new_start: i64) -> Result<()> {
        let mut clips = self.clips.write();
        let Some((old_start, cw)) = clips.find(clip_uuid) else {
            warn!(track = %self.id, clip = %clip_uuid, "move: no such clip");
            return Err(EngineError::MissingEntity(clip_uuid.to_string()));
        };
        if old_start != new_start && clips.map.contains_key(&new_start) {
            return Err(EngineError::InvalidParameter(format!(
                "frame {new_start} is already a clip start on track {}",
                self.id
            )));
        }
        clips.map.remove(&old_start);
        cw.require_resync();
        clips.map.insert(new_start, cw);
        clips.recompute_length();
        info!(track = %self.id, clip = %clip_uuid, old_start, new_start, "moved clip");
        Ok(())
    }

    /// Remove a clip, forcing it to stop first so the decoder and pool
    /// buffers are released. Missing ids are logged no-ops.
    pub fn remove_clip(&self, clip_uuid: Uuid) -> Option<Arc<ClipWorkflow>> {
        let mut clips = self.clips.write();
        let Some((start, cw)) = clips.find(clip_uuid) else {
            warn!(track = %self.id, clip = %clip_uuid, "remove: no such clip");
            return None;
        };
        cw.stop();
        clips.map.remove(&start);
        clips.recompute_length();
        info!(track = %self.id, clip = %clip_uuid, start, "removed clip");
        Some(cw)
    }

    /// Mute a clip: it keeps its slot but contributes no output.
    pub fn mute_clip(&self, clip_uuid: Uuid) {
        match self.clips.read().find(clip_uuid) {
            Some((_, cw)) => cw.mute(),
            None => warn!(track = %self.id, clip = %clip_uuid, "mute: no such clip"),
        }
    }

    /// Unmute a clip back to schedulable.
    pub fn unmute_clip(&self, clip_uuid: Uuid) {
        match self.clips.read().find(clip_uuid) {
            Some((_, cw)) => cw.unmute(),
            None => warn!(track = %self.id, clip = %clip_uuid, "unmute: no such clip"),
        }
    }

    /// Force the next `get_output` to Pop a single fresh frame even while
    /// paused (frame-step). One-shot.
    pub fn render_one_frame(&self) {
        self.pass.lock().render_one_frame = true;
    }

    /// Reset render bookkeeping and warm up clips placed near frame zero.
    pub fn start_render(&self) {
        {
            let mut pass = self.pass.lock();
            pass.last_frame = 0;
            pass.render_one_frame = false;
        }
        let clips = self.clips.read();
        for (&start, cw) in clips.map.iter() {
            if start < PRELOAD_WINDOW {
                Self::preload_clip(cw);
            }
        }
    }

    /// Pause every rendering clip.
    pub fn pause(&self) {
        for cw in self.clips.read().map.values() {
            cw.pause();
        }
    }

    /// Resume every paused clip.
    pub fn unpause(&self) {
        for cw in self.clips.read().map.values() {
            cw.unpause();
        }
    }

    /// Propagate the full-speed flag to every clip's decoder.
    pub fn set_full_speed_render(&self, enabled: bool) {
        for cw in self.clips.read().map.values() {
            cw.set_full_speed_render(enabled);
        }
    }

    /// Derived track length: `max(start + length)` over all clips, 0 when
    /// empty.
    pub fn get_length(&self) -> i64 {
        self.clips.read().length
    }

    /// Whether the track holds a clip with this uuid.
    pub fn contains(&self, clip_uuid: Uuid) -> bool {
        self.clips.read().find(clip_uuid).is_some()
    }

    /// Look up a clip workflow and its start frame.
    pub fn get_clip(&self, clip_uuid: Uuid) -> Option<(i64, Arc<ClipWorkflow>)> {
        self.clips.read().find(clip_uuid)
    }

    /// Number of clips on the track.
    pub fn clip_count(&self) -> usize {
        self.clips.read().map.len()
    }

    /// Stop and remove every clip.
    pub fn clear(&self) {
        let mut clips = self.clips.write();
        for cw in clips.map.values() {
            cw.stop();
        }
        clips.map.clear();
        clips.length = 0;
        info!(track = %self.id, "cleared track");
    }

    pub(crate) fn for_each_clip(&self, mut f: impl FnMut(i64, &Arc<ClipWorkflow>)) {
        for (&start, cw) in self.clips.read().map.iter() {
            f(start, cw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playhead_core::FrameRate;
    use playhead_media::{MediaSource, PatternDecoderFactory};

    fn track() -> TrackWorkflow {
        TrackWorkflow::new(Arc::new(PatternDecoderFactory::new()))
    }

    fn video_helper(frames: i64) -> ClipHelper {
        ClipHelper::new(
            MediaSource::video("clip.mp4", 16, 8, FrameRate::FPS_25, frames),
            0,
            frames,
        )
    }

    #[test]
    fn length_follows_every_mutation() {
        let track = track();
        assert_eq!(track.get_length(), 0);
        let a = track.add_clip(video_helper(100), 0).unwrap();
        assert_eq!(track.get_length(), 100);
        let b = track.add_clip(video_helper(70), 50).unwrap();
        assert_eq!(track.get_length(), 120);
        track.move_clip(b, 200).unwrap();
        assert_eq!(track.get_length(), 270);
        track.remove_clip(b);
        assert_eq!(track.get_length(), 100);
        track.remove_clip(a);
        assert_eq!(track.get_length(), 0);
        track.clear();
        assert_eq!(track.get_length(), 0);
    }

    #[test]
    fn duplicate_start_frame_is_rejected() {
        let track = track();
        track.add_clip(video_helper(10), 0).unwrap();
        assert!(track.add_clip(video_helper(10), 0).is_err());
    }

    #[test]
    fn sequential_playback_renders_to_track_end() {
        let track = track();
        track.add_clip(video_helper(100), 0).unwrap();
        track.start_render();
        for frame in 0..100 {
            let out = track.get_output(frame, frame, false);
            assert!(out.frame.is_some(), "frame {frame} should render");
            assert!(!out.track_end, "no end before frame 100");
        }
        let out = track.get_output(100, 100, false);
        assert!(out.frame.is_none());
        assert!(out.track_end);
    }

    #[test]
    fn interval_scan_picks_only_the_containing_clip() {
        let track = track();
        let first = track.add_clip(video_helper(50), 0).unwrap();
        track.add_clip(video_helper(70), 50).unwrap();
        let out = track.get_output(75, 75, false);
        assert!(out.frame.is_some());
        // The first clip fell into the stop branch of the scan.
        let (_, first_cw) = track.get_clip(first).unwrap();
        assert_eq!(first_cw.state(), ClipState::Stopped);
    }

    #[test]
    fn preload_initializes_upcoming_clip() {
        let track = track();
        track.add_clip(video_helper(100), 0).unwrap();
        let next = track.add_clip(video_helper(50), 120).unwrap();
        let _ = track.get_output(70, 70, false);
        let (_, next_cw) = track.get_clip(next).unwrap();
        assert!(
            matches!(next_cw.state(), ClipState::Initializing | ClipState::Ready),
            "clip 50 frames ahead is inside the preload window"
        );
    }

    #[test]
    fn muted_clip_keeps_slot_but_renders_nothing() {
        let track = track();
        let id = track.add_clip(video_helper(100), 0).unwrap();
        track.mute_clip(id);
        let out = track.get_output(10, 10, false);
        assert!(out.frame.is_none());
        assert!(track.contains(id));
        assert_eq!(track.get_length(), 100);
        track.unmute_clip(id);
        let out = track.get_output(11, 11, false);
        assert!(out.frame.is_some());
    }

    #[test]
    fn failed_clip_leaves_track_playable() {
        let track = TrackWorkflow::new(Arc::new(PatternDecoderFactory::failing()));
        let id = track.add_clip(video_helper(100), 0).unwrap();
        let out = track.get_output(0, 0, false);
        assert!(out.frame.is_none());
        let (_, cw) = track.get_clip(id).unwrap();
        assert_eq!(cw.state(), ClipState::Error);
        // Subsequent requests are quiet no-ops, and the track reports end
        // because its last clip is in error.
        let out = track.get_output(1, 1, false);
        assert!(out.frame.is_none());
        assert!(out.track_end);
    }

    #[test]
    fn move_clip_requires_resync_and_seeks_once() {
        let track = track();
        let id = track.add_clip(video_helper(100), 0).unwrap();
        // Render a little at the original position.
        for frame in 0..3 {
            let _ = track.get_output(frame, frame, false);
        }
        track.move_clip(id, 40).unwrap();
        let (_, cw) = track.get_clip(id).unwrap();
        assert!(cw.resync_required());
        // Next request inside the new interval resyncs exactly once:
        // trim_begin(0ms) + (60 - 40) frames = 800ms at 25 fps.
        let out = track.get_output(60, 60, false);
        assert!(out.frame.is_some());
        assert!(!cw.resync_required());
        let pts = out.frame.as_ref().map(|f| f.buffer().pts()).unwrap_or(-1);
        assert_eq!(pts, 800);
    }

    #[test]
    fn missing_entity_operations_are_noops() {
        let track = track();
        track.add_clip(video_helper(10), 0).unwrap();
        let ghost = Uuid::new_v4();
        assert!(track.move_clip(ghost, 5).is_err());
        assert!(track.remove_clip(ghost).is_none());
        track.mute_clip(ghost);
        track.unmute_clip(ghost);
        assert_eq!(track.clip_count(), 1);
    }

    #[test]
    fn paused_repeat_requests_reuse_the_same_frame() {
        let track = track();
        track.add_clip(video_helper(100), 0).unwrap();
        // Play up to frame 30.
        for frame in 0..=30 {
            let _ = track.get_output(frame, frame, false);
        }
        track.pause();
        // Let any delivery that was in flight when the pause landed settle.
        std::thread::sleep(std::time::Duration::from_millis(100));
        // First paused call at the same sub-frame peeks the newest frame.
        let first = track.get_output(30, 30, true);
        let first_pts = first.frame.as_ref().map(|f| f.buffer().pts());
        assert!(first_pts.is_some());
        drop(first);
        // Identical sub-frame requests peek the same frame.
        let second = track.get_output(30, 30, true);
        let second_pts = second.frame.as_ref().map(|f| f.buffer().pts());
        drop(second);
        let third = track.get_output(30, 30, true);
        let third_pts = third.frame.as_ref().map(|f| f.buffer().pts());
        drop(third);
        assert_eq!(second_pts, third_pts);
        assert!(second_pts.is_some());
    }

    #[test]
    fn frame_step_pops_while_paused() {
        let track = track();
        track.add_clip(video_helper(100), 0).unwrap();
        for frame in 0..=10 {
            let _ = track.get_output(frame, frame, false);
        }
        track.pause();
        let _ = track.get_output(10, 10, true);
        track.render_one_frame();
        let step = track.get_output(11, 11, true);
        assert!(step.frame.is_some());
    }
}
