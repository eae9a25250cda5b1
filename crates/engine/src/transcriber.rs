//! Whole-window transcriber seam
//!
//! The streaming core treats inference as an opaque primitive: hand it a PCM
//! window plus optional decoder context, get back text and the token stream.
//! The native backend and test fakes both plug in here.

use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::text::TokenId;

/// A decoded token with its text piece.
///
/// Pieces carry whisper's leading-space convention, so concatenating them
/// reconstructs the window text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub id: TokenId,
    pub piece: String,
}

/// Everything one inference call produces.
#[derive(Debug, Clone, Default)]
pub struct WindowTranscription {
    /// Non-empty segment texts joined by single spaces, trimmed.
    pub text: String,

    /// Arithmetic mean of strictly-positive per-token probabilities.
    pub confidence: f32,

    /// Full decoded token stream, control tokens included. Source of the
    /// prompt context fed back on later windows.
    pub tokens: Vec<TokenId>,

    /// Token stream with control and special tokens removed. Empty when the
    /// backend exposes no tokens; the engine then falls back to rune diffs.
    pub text_tokens: Vec<Token>,
}

/// Opaque whole-utterance inference primitive over a PCM window.
pub trait Transcriber: Send {
    /// Configure the decode language. `None` means auto-detect. Called only
    /// when the effective `(code, detect)` pair changes.
    fn set_language(&mut self, code: Option<&str>) -> Result<(), EngineError>;

    /// Transcribe one window. `prompt` is decoder context from the previous
    /// window; implementations poll `cancel` at their own granularity and
    /// return `EngineError::Cancelled` when it fires mid-call.
    fn transcribe(
        &mut self,
        window: &[f32],
        prompt: &[TokenId],
        cancel: &CancellationToken,
    ) -> Result<WindowTranscription, EngineError>;
}
