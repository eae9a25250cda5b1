//! Streaming inference core
//!
//! Orchestrates the window buffer, VAD gate and text reconciliation around a
//! whole-window transcriber. Each session owns one `StreamEngine`; calls are
//! serialised by the dispatcher, and the engine itself never holds its state
//! lock across an inference call. A separate mutex wraps the transcriber,
//! which is not re-entrant.

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use whisper_adapter_core::{pcm_to_f32, TranscriptResult};

use crate::error::EngineError;
use crate::text::{diff_transcript, find_common_prefix, is_blank_audio, TokenId};
use crate::transcriber::{Token, Transcriber, WindowTranscription};
use crate::vad::VadGate;
use crate::window::WindowBuffer;
use crate::Options;

/// Decoder context fed back between windows is capped at this many tokens;
/// beyond it the oldest are discarded.
pub const MAX_PROMPT_TOKENS: usize = 224;

/// A window whose trailing tokens are this many identical ids is treated as a
/// decode loop and contributes no delta.
const REPETITION_RUN: usize = 8;

/// Windowing and context configuration for one engine instance.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub step_ms: u32,
    pub length_ms: u32,
    pub keep_ms: u32,
    pub keep_context: bool,
    pub use_vad: bool,
    pub vad_threshold: f32,
    pub freq_threshold: f32,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            step_ms: 3000,
            length_ms: 10_000,
            keep_ms: 200,
            keep_context: true,
            use_vad: false,
            vad_threshold: 0.6,
            freq_threshold: 100.0,
        }
    }
}

enum Windowing {
    Hop(WindowBuffer),
    Vad(VadGate),
}

struct SessionState {
    windowing: Windowing,
    last_window_text: String,
    transcript: String,
    last_confidence: f32,
    prompt_tokens: Vec<TokenId>,
    previous_text_tokens: Vec<TokenId>,
}

struct TranscriberCell<T> {
    inner: Option<T>,
    default_language: String,
    last_code: String,
    last_detect: bool,
    configured: bool,
}

/// Streaming engine core, generic over the transcriber backend.
pub struct StreamEngine<T: Transcriber> {
    opts: StreamOptions,
    // VAD mode carries no overlap and no prompt context.
    keep_context: bool,
    state: Mutex<SessionState>,
    transcriber: Mutex<TranscriberCell<T>>,
}

impl<T: Transcriber> StreamEngine<T> {
    pub fn new(transcriber: T, opts: StreamOptions) -> Self {
        let windowing = if opts.use_vad {
            Windowing::Vad(VadGate::new(
                opts.length_ms,
                opts.vad_threshold,
                opts.freq_threshold,
            ))
        } else {
            Windowing::Hop(WindowBuffer::new(opts.step_ms, opts.length_ms, opts.keep_ms))
        };

        Self {
            keep_context: opts.keep_context && !opts.use_vad,
            opts,
            state: Mutex::new(SessionState {
                windowing,
                last_window_text: String::new(),
                transcript: String::new(),
                last_confidence: 0.0,
                prompt_tokens: Vec::new(),
                previous_text_tokens: Vec::new(),
            }),
            transcriber: Mutex::new(TranscriberCell {
                inner: Some(transcriber),
                default_language: String::new(),
                last_code: String::new(),
                last_detect: false,
                configured: false,
            }),
        }
    }

    /// Process one chunk of PCM16LE audio; emits at most one partial.
    pub fn process_sync(
        &self,
        cancel: &CancellationToken,
        audio: &[u8],
        opts: &Options,
    ) -> Result<Vec<TranscriptResult>, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if audio.is_empty() {
            return Ok(Vec::new());
        }
        let samples = pcm_to_f32(audio);
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let (window, prompt) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            match &mut state.windowing {
                Windowing::Hop(buffer) => {
                    buffer.push(&samples)?;
                    if !buffer.ready() {
                        return Ok(Vec::new());
                    }
                    let window = buffer.take_window();
                    let prompt = if self.keep_context {
                        state.prompt_tokens.clone()
                    } else {
                        Vec::new()
                    };
                    (window, prompt)
                }
                Windowing::Vad(gate) => {
                    gate.push(&samples);
                    if !gate.should_fire() {
                        return Ok(Vec::new());
                    }
                    (gate.take_window(), Vec::new())
                }
            }
        };

        let output = self.run_inference(cancel, &window, &prompt, &opts.language)?;
        if cancel.is_cancelled() {
            // Partial results are dropped on cancellation.
            return Err(EngineError::Cancelled);
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.last_confidence = output.confidence;

        if self.opts.use_vad {
            // Each VAD window is a standalone utterance; no carried context.
            state.last_window_text = output.text.clone();
            state.transcript.clear();
            state.prompt_tokens.clear();
            state.previous_text_tokens.clear();

            let text = output.text.trim();
            if text.is_empty() || is_blank_audio(text) {
                return Ok(Vec::new());
            }
            return Ok(vec![TranscriptResult::partial(text, output.confidence)]);
        }

        let delta = absorb_window(state, &output);

        let reset_due = match &mut state.windowing {
            Windowing::Hop(buffer) => buffer.note_inference(),
            Windowing::Vad(_) => false,
        };
        if reset_due && self.keep_context {
            state.prompt_tokens = tail_tokens(&output.tokens, MAX_PROMPT_TOKENS);
        }

        if delta.is_empty() {
            return Ok(Vec::new());
        }
        if !state.transcript.is_empty() {
            state.transcript.push(' ');
        }
        state.transcript.push_str(&delta);

        Ok(vec![TranscriptResult::partial(delta, output.confidence)])
    }

    /// Fuse residual audio, emit the accumulated transcript as the single
    /// final result, and reset all session state.
    pub fn flush_sync(
        &self,
        cancel: &CancellationToken,
        opts: &Options,
    ) -> Result<Vec<TranscriptResult>, EngineError> {
        if cancel.is_cancelled() {
            self.reset_session();
            return Err(EngineError::Cancelled);
        }

        let (window, prompt) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            match &mut state.windowing {
                Windowing::Hop(buffer) => {
                    if buffer.has_pending() {
                        let window = buffer.take_window();
                        let prompt = if self.keep_context {
                            state.prompt_tokens.clone()
                        } else {
                            Vec::new()
                        };
                        (Some(window), prompt)
                    } else {
                        (None, Vec::new())
                    }
                }
                Windowing::Vad(gate) => {
                    if gate.has_pending() {
                        (Some(gate.take_window()), Vec::new())
                    } else {
                        (None, Vec::new())
                    }
                }
            }
        };

        if let Some(window) = window {
            let output = match self.run_inference(cancel, &window, &prompt, &opts.language) {
                Ok(output) => output,
                Err(err) => {
                    self.reset_session();
                    return Err(err);
                }
            };
            if cancel.is_cancelled() {
                self.reset_session();
                return Err(EngineError::Cancelled);
            }

            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.last_confidence = output.confidence;

            if self.opts.use_vad {
                let text = output.text.trim();
                state.transcript = if is_blank_audio(text) {
                    String::new()
                } else {
                    text.to_string()
                };
            } else {
                let delta = absorb_window(state, &output);
                if !delta.is_empty() {
                    if !state.transcript.is_empty() {
                        state.transcript.push(' ');
                    }
                    state.transcript.push_str(&delta);
                }
            }
        }

        let (final_text, confidence) = {
            let guard = self.state.lock();
            (guard.transcript.trim().to_string(), guard.last_confidence)
        };
        self.reset_session();

        if final_text.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![TranscriptResult::final_result(final_text, confidence)])
    }

    /// Per-engine hint used when the caller asks for `auto`.
    pub fn set_default_language(&self, language: &str) {
        let mut cell = self.transcriber.lock();
        cell.default_language = normalise_language_code(language);
        cell.configured = false;
    }

    /// Reset session state and release the transcriber.
    pub fn close_sync(&self) {
        self.reset_session();
        self.transcriber.lock().inner = None;
    }

    fn run_inference(
        &self,
        cancel: &CancellationToken,
        window: &[f32],
        prompt: &[TokenId],
        language: &str,
    ) -> Result<WindowTranscription, EngineError> {
        let mut cell = self.transcriber.lock();
        apply_language(&mut cell, language)?;
        let transcriber = cell
            .inner
            .as_mut()
            .ok_or_else(|| EngineError::InvalidInput("engine is closed".to_string()))?;

        match transcriber.transcribe(window, prompt, cancel) {
            Err(EngineError::InferenceFailed { .. }) if cancel.is_cancelled() => {
                Err(EngineError::Cancelled)
            }
            other => other,
        }
    }

    fn reset_session(&self) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        match &mut state.windowing {
            Windowing::Hop(buffer) => buffer.reset(),
            Windowing::Vad(gate) => gate.reset(),
        }
        state.last_window_text.clear();
        state.transcript.clear();
        state.prompt_tokens.clear();
        state.previous_text_tokens.clear();
        state.last_confidence = 0.0;
    }

    #[cfg(test)]
    fn prompt_len(&self) -> usize {
        self.state.lock().prompt_tokens.len()
    }

    #[cfg(test)]
    fn buffered_samples(&self) -> (usize, usize) {
        let guard = self.state.lock();
        match &guard.windowing {
            Windowing::Hop(buffer) => (buffer.new_len(), buffer.old_len()),
            Windowing::Vad(_) => (0, 0),
        }
    }
}

/// Update window bookkeeping and return the trimmed delta of `output`
/// relative to the previous window. Token-level when the backend exposes
/// tokens, rune-level otherwise.
fn absorb_window(state: &mut SessionState, output: &WindowTranscription) -> String {
    let previous_window_text = std::mem::take(&mut state.last_window_text);
    state.last_window_text = output.text.clone();

    let delta = if !output.text_tokens.is_empty() {
        let current_ids: Vec<TokenId> = output.text_tokens.iter().map(|t| t.id).collect();
        if has_repetition_loop(&current_ids) {
            // Leave previous_text_tokens pointing at the last stable window;
            // the next inference re-synchronises against it.
            String::new()
        } else {
            let new_start = find_common_prefix(&state.previous_text_tokens, &current_ids);
            let text = tokens_to_text(&output.text_tokens[new_start..]);
            state.previous_text_tokens = current_ids;
            text
        }
    } else {
        diff_transcript(&previous_window_text, &output.text)
    };

    if is_blank_audio(&delta) {
        return String::new();
    }
    delta
}

fn apply_language<T: Transcriber>(
    cell: &mut TranscriberCell<T>,
    language: &str,
) -> Result<(), EngineError> {
    let hint = language.trim();
    let hint = if hint.is_empty() || hint.eq_ignore_ascii_case("auto") {
        cell.default_language.clone()
    } else {
        hint.to_ascii_lowercase()
    };
    let detect = hint.is_empty();

    if cell.configured && cell.last_code == hint && cell.last_detect == detect {
        return Ok(());
    }

    let transcriber = cell
        .inner
        .as_mut()
        .ok_or_else(|| EngineError::InvalidInput("engine is closed".to_string()))?;
    transcriber.set_language(if detect { None } else { Some(&hint) })?;

    cell.last_code = hint;
    cell.last_detect = detect;
    cell.configured = true;
    Ok(())
}

fn normalise_language_code(language: &str) -> String {
    let trimmed = language.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
        return String::new();
    }
    trimmed.to_ascii_lowercase()
}

fn has_repetition_loop(tokens: &[TokenId]) -> bool {
    if tokens.len() < REPETITION_RUN {
        return false;
    }
    let last = tokens[tokens.len() - 1];
    tokens[tokens.len() - REPETITION_RUN..]
        .iter()
        .all(|&token| token == last)
}

fn tail_tokens(tokens: &[TokenId], cap: usize) -> Vec<TokenId> {
    tokens[tokens.len().saturating_sub(cap)..].to_vec()
}

fn tokens_to_text(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|token| token.piece.as_str())
        .collect::<String>()
        .trim()
        .to_string()
}
