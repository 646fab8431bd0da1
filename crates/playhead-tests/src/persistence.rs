//! Integration tests for track persistence.
//!
//! A manifest stores clip placements by media identity; restoring resolves
//! each identity back to a source through a caller-supplied resolver and
//! yields a track that renders exactly like the original.

use std::collections::HashMap;
use std::sync::Arc;

use playhead_core::FrameRate;
use playhead_engine::{ClipHelper, TrackManifest, TrackWorkflow};
use playhead_media::{MediaSource, PatternDecoderFactory};
use uuid::Uuid;

// ── Helpers ────────────────────────────────────────────────────

fn track() -> TrackWorkflow {
    crate::init_logging();
    TrackWorkflow::new(Arc::new(PatternDecoderFactory::new()))
}

fn source(path: &str, frames: i64) -> MediaSource {
    MediaSource::video(path, 16, 8, FrameRate::FPS_25, frames)
}

// ── Round trip ─────────────────────────────────────────────────

#[test]
fn restored_track_matches_the_original() {
    let original = track();
    let intro = source("intro.mp4", 100);
    let body = source("body.mp4", 200);
    let mut library: HashMap<Uuid, MediaSource> = HashMap::new();
    library.insert(intro.uuid, intro.clone());
    library.insert(body.uuid, body.clone());

    let intro_id = original.add_clip(ClipHelper::new(intro, 0, 50), 0).unwrap();
    let body_id = original
        .add_clip(ClipHelper::new(body, 10, 110), 50)
        .unwrap();

    let json = original.manifest().to_json().unwrap();
    let manifest = TrackManifest::from_json(&json).unwrap();

    let restored = track();
    restored
        .restore(&manifest, &|uuid| library.get(uuid).cloned())
        .unwrap();

    assert_eq!(restored.clip_count(), 2);
    assert_eq!(restored.get_length(), original.get_length());
    assert!(restored.contains(intro_id));
    assert!(restored.contains(body_id));
}

#[test]
fn restored_trims_shift_the_decoder_clock() {
    let original = track();
    let media = source("clip.mp4", 100);
    let library = media.clone();
    original.add_clip(ClipHelper::new(media, 10, 60), 0).unwrap();
    let manifest = original.manifest();

    let restored = track();
    restored
        .restore(&manifest, &|uuid| {
            (*uuid == library.uuid).then(|| library.clone())
        })
        .unwrap();
    restored.start_render();

    // trim_begin of 10 frames at 25 fps puts the first output at 400 ms.
    let out = restored.get_output(0, 0, false);
    let frame = out.frame.expect("restored clip renders");
    assert_eq!(frame.buffer().pts(), 400);
}

// ── Degraded restores ──────────────────────────────────────────

#[test]
fn unresolvable_media_is_dropped_not_fatal() {
    let original = track();
    let known = source("known.mp4", 50);
    let lost = source("lost.mp4", 50);
    let known_uuid = known.uuid;
    let known_clone = known.clone();
    original.add_clip(ClipHelper::new(known, 0, 50), 0).unwrap();
    original.add_clip(ClipHelper::new(lost, 0, 50), 50).unwrap();
    let manifest = original.manifest();

    let restored = track();
    restored
        .restore(&manifest, &|uuid| {
            (*uuid == known_uuid).then(|| known_clone.clone())
        })
        .unwrap();

    assert_eq!(restored.clip_count(), 1);
    assert_eq!(restored.get_length(), 50);
}

#[test]
fn malformed_manifest_is_an_error() {
    assert!(TrackManifest::from_json("{ not json").is_err());
    assert!(TrackManifest::from_json("{\"clips\": 3}").is_err());
}
