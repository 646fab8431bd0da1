//! Error types for the Playhead engine.

use thiserror::Error;

/// Main error type for engine operations.
///
/// Failures inside the decoder callback path never surface as errors here;
/// they are captured as a clip state transition to `Error` and observed by
/// the next state check.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decoder initialization failed: {0}")]
    Initialization(String),

    #[error("decoder error: {0}")]
    Decoder(String),

    #[error("media error: {0}")]
    Media(String),

    #[error("no such entity: {0}")]
    MissingEntity(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
