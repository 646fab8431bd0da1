//! Track persistence.
//!
//! A track serializes to a manifest of clip placements. Media is stored by
//! identity only; on restore a resolver maps each media UUID back to a
//! [`MediaSource`], so the manifest stays valid when the library moves.

use playhead_core::{EngineError, Result};
use playhead_media::MediaSource;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::clip::ClipHelper;
use crate::track::TrackWorkflow;

/// Persisted form of one clip placement on a track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipEntry {
    pub clip_uuid: Uuid,
    pub helper_uuid: Uuid,
    pub media_uuid: Uuid,
    pub start_frame: i64,
    pub trim_begin: i64,
    pub trim_end: i64,
}

/// Persisted form of a whole track.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackManifest {
    pub clips: Vec<ClipEntry>,
}

impl TrackManifest {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::Serialization(e.to_string()))
    }
}

impl TrackWorkflow {
    /// Snapshot the track's clip placements.
    pub fn manifest(&self) -> TrackManifest {
        let mut clips = Vec::new();
        self.for_each_clip(|start_frame, cw| {
            let helper = cw.helper();
            clips.push(ClipEntry {
                clip_uuid: helper.clip_uuid,
                helper_uuid: helper.uuid,
                media_uuid: helper.source.uuid,
                start_frame,
                trim_begin: helper.trim_begin,
                trim_end: helper.trim_end,
            });
        });
        TrackManifest { clips }
    }

    /// Re-populate the track from a manifest.
    ///
    /// `resolver` maps a media UUID to its source description. Entries whose
    /// media cannot be resolved are skipped with a warning rather than
    /// failing the whole restore.
    pub fn restore(
        &self,
        manifest: &TrackManifest,
        resolver: &dyn Fn(&Uuid) -> Option<MediaSource>,
    ) -> Result<()> {
        for entry in &manifest.clips {
            let Some(source) = resolver(&entry.media_uuid) else {
                warn!(media = %entry.media_uuid, "unresolved media, skipping clip");
                continue;
            };
            let helper = ClipHelper::with_ids(
                source,
                entry.trim_begin,
                entry.trim_end,
                entry.clip_uuid,
                entry.helper_uuid,
            );
            self.add_clip(helper, entry.start_frame)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playhead_core::FrameRate;
    use playhead_media::PatternDecoderFactory;
    use std::sync::Arc;

    fn track() -> TrackWorkflow {
        TrackWorkflow::new(Arc::new(PatternDecoderFactory::new()))
    }

    fn source() -> MediaSource {
        MediaSource::video("clip.mp4", 16, 8, FrameRate::FPS_25, 100)
    }

    #[test]
    fn manifest_round_trip_preserves_placement() {
        let t = track();
        let src = source();
        let media_uuid = src.uuid;
        t.add_clip(ClipHelper::new(src.clone(), 10, 60), 40).unwrap();

        let json = t.manifest().to_json().unwrap();
        let manifest = TrackManifest::from_json(&json).unwrap();
        assert_eq!(manifest.clips.len(), 1);
        assert_eq!(manifest.clips[0].start_frame, 40);
        assert_eq!(manifest.clips[0].trim_begin, 10);
        assert_eq!(manifest.clips[0].media_uuid, media_uuid);

        let restored = track();
        restored
            .restore(&manifest, &|uuid| {
                (*uuid == media_uuid).then(|| src.clone())
            })
            .unwrap();
        assert_eq!(restored.clip_count(), 1);
        assert_eq!(restored.get_length(), 90);
        assert!(restored.contains(manifest.clips[0].clip_uuid));
    }

    #[test]
    fn unresolved_media_is_skipped() {
        let t = track();
        t.add_clip(ClipHelper::new(source(), 0, 100), 0).unwrap();
        let manifest = t.manifest();

        let restored = track();
        restored.restore(&manifest, &|_| None).unwrap();
        assert_eq!(restored.clip_count(), 0);
    }
}
