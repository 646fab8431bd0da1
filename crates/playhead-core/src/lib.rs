//! Playhead Core - Foundation types for the timeline rendering engine
//!
//! This crate provides the fundamental types used throughout Playhead:
//! - Time representation (FrameRate, RationalTime)
//! - Fixed-capacity frame and sample buffers
//! - The engine error taxonomy

pub mod error;
pub mod frame;
pub mod time;

pub use error::{EngineError, Result};
pub use frame::{AudioBuffer, Frame, FrameKind, VideoBuffer};
pub use time::{FrameRate, RationalTime};

/// Pipeline sizing constants.
pub mod pipeline {
    /// Per-clip buffer pool depth (decoder look-ahead + renderer in-flight).
    pub const POOL_DEPTH: usize = 8;

    /// Frames of look-ahead within which a clip's decoder is started early.
    pub const PRELOAD_WINDOW: i64 = 60;
}
