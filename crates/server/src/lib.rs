//! Whisper adapter server
//!
//! Serves the bidirectional transcription stream over WebSocket, plus
//! health, readiness and metrics endpoints.

pub mod dispatcher;
pub mod http;
pub mod state;
pub mod telemetry;
pub mod ws;

pub use dispatcher::{resolve_language, SessionDispatcher, LANGUAGE_METADATA_KEY};
pub use http::create_router;
pub use state::AppState;
pub use telemetry::{init_metrics, Recorder, StreamMetrics};

use thiserror::Error;

/// Server errors.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Engine(#[from] whisper_adapter_engine::EngineError),
}
