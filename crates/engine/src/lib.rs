//! Streaming speech-to-text engines
//!
//! The streaming core accumulates PCM into overlapping windows, runs a
//! whole-utterance transcriber over each, and reconciles the outputs into
//! monotone partial transcripts plus one final transcript per session.
//!
//! Two implementations share the `Engine` interface: the native
//! whisper-backed engine (behind the `whisper` feature) and a deterministic
//! stub for tests and modelless deployments.

pub mod error;
mod factory;
mod models;
pub mod stream;
mod stub;
pub mod text;
pub mod transcriber;
pub mod vad;
pub mod window;

#[cfg(feature = "whisper")]
mod native;

pub use error::EngineError;
pub use factory::{build, EngineHandle};
pub use models::ModelResolver;
pub use stream::{StreamEngine, StreamOptions, MAX_PROMPT_TOKENS};
pub use stub::StubEngine;

#[cfg(feature = "whisper")]
pub use native::NativeEngine;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use whisper_adapter_config::Config;
use whisper_adapter_core::TranscriptResult;

/// Per-call decoding options.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Empty, `"auto"`, or a short ISO 639-1 code; case-insensitive.
    pub language: String,

    /// Hint that this is the last segment of the stream.
    pub is_final: bool,

    /// Sequence number echoed on emitted transcripts.
    pub sequence: u64,
}

/// Streaming transcription interface shared by the native and stub engines.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Process a chunk of PCM16LE audio; may emit zero or one partial.
    async fn process(
        &self,
        cancel: CancellationToken,
        audio: Vec<u8>,
        opts: Options,
    ) -> Result<Vec<TranscriptResult>, EngineError>;

    /// Finalise the session, emitting any buffered transcript, and reset.
    async fn flush(
        &self,
        cancel: CancellationToken,
        opts: Options,
    ) -> Result<Vec<TranscriptResult>, EngineError>;

    /// Per-engine hint used when a call asks for `auto` detection.
    fn set_default_language(&self, language: &str);

    /// Release underlying resources.
    async fn close(&self) -> Result<(), EngineError>;
}

/// Whether the native whisper backend was compiled in.
pub fn native_available() -> bool {
    cfg!(feature = "whisper")
}

/// Options for the native backend.
#[derive(Debug, Clone)]
pub struct NativeOptions {
    pub use_gpu: Option<bool>,
    pub flash_attention: Option<bool>,
    pub threads: Option<i32>,
    pub beam_size: Option<i32>,
    pub translate: bool,
    pub temperature_inc: f32,
    pub disable_fallback: bool,
    pub max_tokens: u32,
    pub audio_ctx: u32,
    pub stream: StreamOptions,
}

impl Default for NativeOptions {
    fn default() -> Self {
        Self {
            use_gpu: None,
            flash_attention: None,
            threads: None,
            beam_size: None,
            translate: false,
            temperature_inc: 0.2,
            disable_fallback: false,
            max_tokens: 0,
            audio_ctx: 0,
            stream: StreamOptions::default(),
        }
    }
}

impl NativeOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            use_gpu: cfg.use_gpu,
            flash_attention: cfg.flash_attention,
            threads: cfg.threads,
            beam_size: cfg.beam_size,
            translate: cfg.translate,
            temperature_inc: cfg.temperature_inc,
            disable_fallback: cfg.disable_fallback,
            max_tokens: cfg.max_tokens,
            audio_ctx: cfg.audio_ctx,
            stream: StreamOptions {
                step_ms: cfg.step_ms,
                length_ms: cfg.length_ms,
                keep_ms: cfg.keep_ms,
                keep_context: cfg.keep_context,
                use_vad: cfg.use_vad,
                vad_threshold: cfg.vad_threshold,
                freq_threshold: cfg.freq_threshold,
            },
        }
    }
}
