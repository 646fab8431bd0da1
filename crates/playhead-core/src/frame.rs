//! Fixed-capacity frame and sample buffers.
//!
//! Buffers are allocated once, owned by a per-clip pool, and reused for the
//! lifetime of the clip. Nothing on the decode or render hot path allocates.

use serde::{Deserialize, Serialize};

/// Kind of payload a [`Frame`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    Video,
    Audio,
}

/// A reusable RGBA video frame buffer.
///
/// `pts` is the decoder's presentation timestamp in milliseconds; `pts_diff`
/// is the drift between this frame and the previously delivered one.
#[derive(Debug, Clone)]
pub struct VideoBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
    /// Presentation timestamp in milliseconds.
    pub pts: i64,
    /// Drift relative to the previously delivered frame.
    pub pts_diff: i64,
}

impl VideoBuffer {
    /// Bytes per pixel (RGBA8).
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Create a zeroed buffer of the given dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize * Self::BYTES_PER_PIXEL],
            pts: 0,
            pts_diff: 0,
        }
    }

    /// An all-black frame, used as the fallback when no clip renders.
    pub fn black(width: u32, height: u32) -> Self {
        let mut buf = Self::new(width, height);
        for px in buf.data.chunks_exact_mut(Self::BYTES_PER_PIXEL) {
            px[3] = 255;
        }
        buf
    }

    /// Frame width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw pixel bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw pixel bytes, for the decoder to fill in place.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Overwrite the pixels with a color-bars test pattern.
    ///
    /// `phase` shifts the bars so successive frames are distinguishable.
    pub fn fill_test_pattern(&mut self, phase: u32) {
        const COLORS: [[u8; 4]; 8] = [
            [255, 255, 255, 255], // White
            [255, 255, 0, 255],   // Yellow
            [0, 255, 255, 255],   // Cyan
            [0, 255, 0, 255],     // Green
            [255, 0, 255, 255],   // Magenta
            [255, 0, 0, 255],     // Red
            [0, 0, 255, 255],     // Blue
            [0, 0, 0, 255],       // Black
        ];
        let width = self.width.max(1);
        for (i, px) in self.data.chunks_exact_mut(Self::BYTES_PER_PIXEL).enumerate() {
            let x = (i as u32 % width + phase) % width;
            let bar = (x * 8 / width) as usize % COLORS.len();
            px.copy_from_slice(&COLORS[bar]);
        }
    }
}

/// A reusable interleaved audio sample block.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    channels: u16,
    samples: Vec<i16>,
    /// Presentation timestamp in milliseconds.
    pub pts: i64,
    /// Drift relative to the previously delivered block.
    pub pts_diff: i64,
}

impl AudioBuffer {
    /// Create a silent block holding `frames` sample frames.
    pub fn new(channels: u16, frames: usize) -> Self {
        Self {
            channels,
            samples: vec![0i16; frames * channels as usize],
            pts: 0,
            pts_diff: 0,
        }
    }

    /// A silent block, used as the fallback when no clip renders.
    pub fn silence(channels: u16, frames: usize) -> Self {
        Self::new(channels, frames)
    }

    /// Channel count.
    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Interleaved samples.
    #[inline]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Mutable interleaved samples, for the decoder to fill in place.
    #[inline]
    pub fn samples_mut(&mut self) -> &mut [i16] {
        &mut self.samples
    }

    /// Zero every sample without releasing capacity.
    pub fn clear(&mut self) {
        self.samples.fill(0);
    }

    /// Saturating-add another block into this one (track mixing).
    pub fn mix_from(&mut self, other: &AudioBuffer) {
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            *dst = dst.saturating_add(*src);
        }
    }
}

/// A frame buffer as it travels through a clip's producer/consumer queues.
#[derive(Debug, Clone)]
pub enum Frame {
    Video(VideoBuffer),
    Audio(AudioBuffer),
}

impl Frame {
    /// Payload kind.
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Video(_) => FrameKind::Video,
            Frame::Audio(_) => FrameKind::Audio,
        }
    }

    /// Presentation timestamp in milliseconds.
    pub fn pts(&self) -> i64 {
        match self {
            Frame::Video(v) => v.pts,
            Frame::Audio(a) => a.pts,
        }
    }

    /// PTS drift relative to the previously delivered frame.
    pub fn pts_diff(&self) -> i64 {
        match self {
            Frame::Video(v) => v.pts_diff,
            Frame::Audio(a) => a.pts_diff,
        }
    }

    /// Stamp timing metadata after the decoder filled the payload.
    pub fn set_pts(&mut self, pts: i64, pts_diff: i64) {
        match self {
            Frame::Video(v) => {
                v.pts = pts;
                v.pts_diff = pts_diff;
            }
            Frame::Audio(a) => {
                a.pts = pts;
                a.pts_diff = pts_diff;
            }
        }
    }

    /// View as a video buffer, if it is one.
    pub fn as_video(&self) -> Option<&VideoBuffer> {
        match self {
            Frame::Video(v) => Some(v),
            Frame::Audio(_) => None,
        }
    }

    /// View as an audio buffer, if it is one.
    pub fn as_audio(&self) -> Option<&AudioBuffer> {
        match self {
            Frame::Audio(a) => Some(a),
            Frame::Video(_) => None,
        }
    }

    /// Mutable video view.
    pub fn as_video_mut(&mut self) -> Option<&mut VideoBuffer> {
        match self {
            Frame::Video(v) => Some(v),
            Frame::Audio(_) => None,
        }
    }

    /// Mutable audio view.
    pub fn as_audio_mut(&mut self) -> Option<&mut AudioBuffer> {
        match self {
            Frame::Audio(a) => Some(a),
            Frame::Video(_) => None,
        }
    }
}
