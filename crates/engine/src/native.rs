//! Native whisper backend
//!
//! Binds whisper.cpp through `whisper-rs`. The transcriber owns the context
//! and its decode state; the inference mutex inside `StreamEngine`
//! serialises calls, so this type never sees concurrent use. Blocking
//! inference runs on the tokio blocking pool.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperError,
    WhisperState,
};

use whisper_adapter_core::TranscriptResult;

use crate::error::EngineError;
use crate::stream::StreamEngine;
use crate::text::{is_blank_audio, TokenId};
use crate::transcriber::{Token, Transcriber, WindowTranscription};
use crate::{Engine, NativeOptions, Options};

pub struct WhisperTranscriber {
    context: WhisperContext,
    state: WhisperState,

    threads: i32,
    beam_size: i32,
    translate: bool,
    temperature_inc: f32,
    disable_fallback: bool,
    max_tokens: u32,
    audio_ctx: u32,
    single_segment: bool,
    no_context: bool,

    language: Option<String>,
}

impl WhisperTranscriber {
    pub fn open(model_path: &Path, options: &NativeOptions) -> Result<Self, EngineError> {
        let path = model_path.to_str().ok_or_else(|| {
            EngineError::InvalidInput(format!(
                "model path is not valid UTF-8: {}",
                model_path.display()
            ))
        })?;
        if path.trim().is_empty() {
            return Err(EngineError::InvalidInput("model path is required".to_string()));
        }

        let mut context_params = WhisperContextParameters::default();
        context_params.use_gpu = options.use_gpu.unwrap_or(true);
        context_params.flash_attn = options.flash_attention.unwrap_or(true);

        let context = WhisperContext::new_with_params(path, context_params).map_err(|err| {
            EngineError::Model(format!("failed to initialise context for {path}: {err}"))
        })?;
        let state = context
            .create_state()
            .map_err(|err| EngineError::Model(format!("failed to initialise state: {err}")))?;

        let threads = match options.threads {
            Some(threads) if threads > 0 => threads,
            _ => num_cpus::get() as i32,
        };

        Ok(Self {
            context,
            state,
            threads,
            beam_size: options.beam_size.unwrap_or(1),
            translate: options.translate,
            temperature_inc: options.temperature_inc,
            disable_fallback: options.disable_fallback,
            max_tokens: options.max_tokens,
            audio_ctx: options.audio_ctx,
            single_segment: !options.stream.use_vad,
            no_context: !(options.stream.keep_context && !options.stream.use_vad),
            language: None,
        })
    }

    /// Whether a decoded token contributes to the text stream. Control
    /// tokens and bracketed special identifiers (e.g. `[_TT_150]`) do not.
    fn is_text_token(&self, id: TokenId, piece: &str) -> bool {
        if piece.is_empty() || piece.starts_with("[_") {
            return false;
        }

        let token_beg = self.context.token_beg();
        if id == self.context.token_eot()
            || id == self.context.token_sot()
            || id == self.context.token_solm()
            || id == self.context.token_prev()
            || id == self.context.token_nosp()
            || id == self.context.token_not()
            || id == token_beg
        {
            return false;
        }
        if token_beg != -1 && id >= token_beg {
            return false;
        }
        true
    }
}

fn inference_error(err: WhisperError) -> EngineError {
    match err {
        WhisperError::GenericError(code) => EngineError::InferenceFailed { code },
        other => EngineError::Model(other.to_string()),
    }
}

impl Transcriber for WhisperTranscriber {
    fn set_language(&mut self, code: Option<&str>) -> Result<(), EngineError> {
        self.language = code.map(str::to_string);
        Ok(())
    }

    fn transcribe(
        &mut self,
        window: &[f32],
        prompt: &[TokenId],
        cancel: &CancellationToken,
    ) -> Result<WindowTranscription, EngineError> {
        let strategy = if self.beam_size > 1 {
            SamplingStrategy::BeamSearch {
                beam_size: self.beam_size,
                patience: -1.0,
            }
        } else {
            SamplingStrategy::Greedy { best_of: 1 }
        };

        let language = self.language.clone();

        let mut params = FullParams::new(strategy);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_special(false);
        params.set_print_timestamps(false);
        params.set_translate(self.translate);
        params.set_single_segment(self.single_segment);
        params.set_no_context(self.no_context);
        params.set_n_threads(self.threads);
        params.set_temperature_inc(if self.disable_fallback {
            0.0
        } else {
            self.temperature_inc
        });
        if self.max_tokens > 0 {
            params.set_max_tokens(self.max_tokens as i32);
        }
        if self.audio_ctx > 0 {
            params.set_audio_ctx(self.audio_ctx as i32);
        }
        match language.as_deref() {
            Some(code) => {
                params.set_language(Some(code));
                params.set_detect_language(false);
            }
            None => {
                params.set_language(None);
                params.set_detect_language(true);
            }
        }
        if !self.no_context && !prompt.is_empty() {
            params.set_tokens(prompt);
        }

        // The library polls this at its internal granularity; a cancelled
        // session context interrupts the call.
        let abort = cancel.clone();
        params.set_abort_callback_safe(move || abort.is_cancelled());

        if let Err(err) = self.state.full(params, window) {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            return Err(inference_error(err));
        }

        let n_segments = self.state.full_n_segments().map_err(inference_error)?;

        let mut text = String::new();
        let mut prob_sum = 0.0f64;
        let mut prob_count = 0usize;
        let mut tokens: Vec<TokenId> = Vec::new();
        let mut text_tokens: Vec<Token> = Vec::new();

        for segment in 0..n_segments {
            let segment_text = self
                .state
                .full_get_segment_text(segment)
                .map_err(inference_error)?;
            let segment_text = segment_text.trim();
            if !segment_text.is_empty() && !is_blank_audio(segment_text) {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(segment_text);
            }

            let n_tokens = self.state.full_n_tokens(segment).map_err(inference_error)?;
            for index in 0..n_tokens {
                let data = self
                    .state
                    .full_get_token_data(segment, index)
                    .map_err(inference_error)?;
                if data.p > 0.0 {
                    prob_sum += data.p as f64;
                    prob_count += 1;
                }
                tokens.push(data.id);

                let piece = self.context.token_to_str(data.id).unwrap_or_default();
                if self.is_text_token(data.id, &piece) {
                    text_tokens.push(Token {
                        id: data.id,
                        piece,
                    });
                }
            }
        }

        let confidence = if prob_count > 0 {
            (prob_sum / prob_count as f64) as f32
        } else {
            0.0
        };

        Ok(WindowTranscription {
            text: text.trim().to_string(),
            confidence,
            tokens,
            text_tokens,
        })
    }
}

/// Streaming engine backed by whisper.cpp.
pub struct NativeEngine {
    inner: Arc<StreamEngine<WhisperTranscriber>>,
}

impl NativeEngine {
    pub fn open(model_path: &Path, options: &NativeOptions) -> Result<Self, EngineError> {
        let transcriber = WhisperTranscriber::open(model_path, options)?;
        Ok(Self {
            inner: Arc::new(StreamEngine::new(transcriber, options.stream.clone())),
        })
    }
}

#[async_trait]
impl Engine for NativeEngine {
    async fn process(
        &self,
        cancel: CancellationToken,
        audio: Vec<u8>,
        opts: Options,
    ) -> Result<Vec<TranscriptResult>, EngineError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.process_sync(&cancel, &audio, &opts))
            .await
            .map_err(|err| EngineError::Model(format!("inference task failed: {err}")))?
    }

    async fn flush(
        &self,
        cancel: CancellationToken,
        opts: Options,
    ) -> Result<Vec<TranscriptResult>, EngineError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.flush_sync(&cancel, &opts))
            .await
            .map_err(|err| EngineError::Model(format!("inference task failed: {err}")))?
    }

    fn set_default_language(&self, language: &str) {
        self.inner.set_default_language(language);
    }

    async fn close(&self) -> Result<(), EngineError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.close_sync())
            .await
            .map_err(|err| EngineError::Model(format!("close task failed: {err}")))?;
        Ok(())
    }
}
