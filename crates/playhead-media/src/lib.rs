//! Playhead Media - the decoder collaborator boundary
//!
//! This crate handles:
//! - The `Decoder` control contract the engine drives
//! - The typed frame-delivery callback interface (`FrameSink`)
//! - Media probing (`MediaSource`)
//! - A built-in threaded test-pattern decoder (`PatternDecoder`)

pub mod decoder;
pub mod pattern;
pub mod probe;

pub use decoder::{Decoder, DecoderFactory, FrameLease, FrameSink};
pub use pattern::{PatternDecoder, PatternDecoderFactory};
pub use probe::{MediaSource, SourceKind};
