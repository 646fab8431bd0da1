//! Playhead Engine - timeline rendering core
//!
//! Implements the realtime producer/consumer pipeline of the editor:
//! - Per-clip buffer pools and the one-shot ownership token (`StackedBuffer`)
//! - The clip workflow state machine wrapping one decoder
//! - The per-track scheduler deciding which clip renders each frame
//! - The timeline driver boundary that merges per-track outputs

pub mod clip;
pub mod pool;
pub mod serialization;
pub mod stacked;
pub mod timeline;
pub mod track;

pub use clip::{ClipHelper, ClipState, ClipWorkflow, GetMode};
pub use pool::BufferQueues;
pub use serialization::{ClipEntry, TrackManifest};
pub use stacked::{ReleasePolicy, StackedBuffer, StackedFrame};
pub use timeline::{Timeline, TimelineOutput};
pub use track::{TrackOutput, TrackWorkflow};
