//! Media probing to get metadata without a full decode.

use playhead_core::{EngineError, FrameRate, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// What kind of frames a source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Streamed video frames.
    Video,
    /// A single still, re-delivered for every requested frame.
    Image,
    /// Interleaved audio sample blocks.
    Audio,
}

/// Description of a source media, as seen by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaSource {
    /// Stable identity of the media in the library.
    pub uuid: Uuid,
    /// File path
    pub path: String,
    /// Source kind
    pub kind: SourceKind,
    /// Frame width in pixels (video/image)
    pub width: u32,
    /// Frame height in pixels (video/image)
    pub height: u32,
    /// Frame rate frames are produced at
    pub frame_rate: FrameRate,
    /// Sample rate (audio)
    pub sample_rate: u32,
    /// Channel count (audio)
    pub channels: u16,
    /// Source duration in frames. Ignored for stills.
    pub duration_frames: i64,
}

impl MediaSource {
    /// Describe a video source.
    pub fn video(
        path: impl Into<String>,
        width: u32,
        height: u32,
        frame_rate: FrameRate,
        duration_frames: i64,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            path: path.into(),
            kind: SourceKind::Video,
            width,
            height,
            frame_rate,
            sample_rate: 0,
            channels: 0,
            duration_frames,
        }
    }

    /// Describe a still-image source.
    pub fn image(path: impl Into<String>, width: u32, height: u32, frame_rate: FrameRate) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            path: path.into(),
            kind: SourceKind::Image,
            width,
            height,
            frame_rate,
            sample_rate: 0,
            channels: 0,
            duration_frames: i64::MAX,
        }
    }

    /// Describe an audio source.
    pub fn audio(
        path: impl Into<String>,
        sample_rate: u32,
        channels: u16,
        frame_rate: FrameRate,
        duration_frames: i64,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            path: path.into(),
            kind: SourceKind::Audio,
            width: 0,
            height: 0,
            frame_rate,
            sample_rate,
            channels,
            duration_frames,
        }
    }

    /// Probe a media file.
    ///
    /// Classifies by extension and fills in placeholder stream parameters.
    /// A production build would shell out to a prober here; the engine only
    /// needs the resulting description.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EngineError::MissingEntity(format!(
                "file not found: {}",
                path.display()
            )));
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let path_str = path.to_string_lossy().to_string();
        let source = match ext.as_str() {
            "png" | "jpg" | "jpeg" | "bmp" | "tiff" => {
                Self::image(path_str, 1920, 1080, FrameRate::default())
            }
            "wav" | "mp3" | "flac" | "ogg" => {
                Self::audio(path_str, 48_000, 2, FrameRate::default(), 250 * 60)
            }
            _ => Self::video(path_str, 1920, 1080, FrameRate::default(), 250 * 60),
        };
        tracing::info!(path = %source.path, kind = ?source.kind, "probed media");
        Ok(source)
    }

    /// Samples per video-frame-sized audio block.
    pub fn samples_per_block(&self) -> usize {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.sample_rate as u64 * self.frame_rate.denominator as u64
            / self.frame_rate.numerator as u64) as usize
    }

    /// Duration of the source in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        if self.duration_frames == i64::MAX {
            return i64::MAX;
        }
        self.frame_rate.frame_to_ms(self.duration_frames)
    }
}
