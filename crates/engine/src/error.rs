//! Engine error taxonomy

use thiserror::Error;

/// Errors surfaced by the streaming engines.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Bad caller input: empty model path, unsupported format, out-of-range
    /// option. Surfaced at open time.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// `audio_new` would exceed the window length. The buffer is left intact
    /// so the caller may retry after draining.
    #[error("audio buffer overflow (max {max_samples} samples)")]
    AudioBufferOverflow { max_samples: usize },

    /// The transcriber returned a failure and the call was not cancelled.
    #[error("inference failed with code {code}")]
    InferenceFailed { code: i32 },

    /// The call context was cancelled. Always preferred over
    /// `InferenceFailed` when both could apply.
    #[error("operation cancelled")]
    Cancelled,

    /// Model resolution or backend initialisation failure.
    #[error("model: {0}")]
    Model(String),
}

impl EngineError {
    /// Whether this error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}
