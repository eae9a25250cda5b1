//! Stub engine
//!
//! Produces deterministic transcripts without touching whisper. Used when no
//! model can be resolved, when the native backend is compiled out, or when
//! forced by configuration.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use whisper_adapter_core::TranscriptResult;

use crate::error::EngineError;
use crate::{Engine, Options};

pub struct StubEngine {
    model_variant: String,
    total_bytes: AtomicUsize,
}

impl StubEngine {
    pub fn new(model_variant: &str) -> Self {
        Self {
            model_variant: model_variant.to_string(),
            total_bytes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Engine for StubEngine {
    async fn process(
        &self,
        cancel: CancellationToken,
        audio: Vec<u8>,
        opts: Options,
    ) -> Result<Vec<TranscriptResult>, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if audio.is_empty() {
            return Ok(Vec::new());
        }
        self.total_bytes.fetch_add(audio.len(), Ordering::Relaxed);

        let text = format!(
            "[stub:{}] received {} bytes",
            self.model_variant,
            audio.len()
        );
        tracing::debug!(
            bytes = audio.len(),
            sequence = opts.sequence,
            final_requested = opts.is_final,
            "stub transcript"
        );
        Ok(vec![TranscriptResult::partial(text, 0.42)])
    }

    async fn flush(
        &self,
        cancel: CancellationToken,
        _opts: Options,
    ) -> Result<Vec<TranscriptResult>, EngineError> {
        let total = self.total_bytes.swap(0, Ordering::Relaxed);
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let text = format!("[stub:{}] total bytes {total}", self.model_variant);
        tracing::debug!(total_bytes = total, "stub flush");
        Ok(vec![TranscriptResult::final_result(text, 1.0)])
    }

    fn set_default_language(&self, _language: &str) {}

    async fn close(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_round_trip() {
        let engine = StubEngine::new("small");
        let cancel = CancellationToken::new();

        let partials = engine
            .process(cancel.clone(), b"test".to_vec(), Options::default())
            .await
            .unwrap();
        assert_eq!(partials.len(), 1);
        assert_eq!(partials[0].text, "[stub:small] received 4 bytes");
        assert!((partials[0].confidence - 0.42).abs() < 1e-6);
        assert!(!partials[0].is_final);

        let finals = engine.flush(cancel, Options::default()).await.unwrap();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].text, "[stub:small] total bytes 4");
        assert!((finals[0].confidence - 1.0).abs() < 1e-6);
        assert!(finals[0].is_final);
    }

    #[tokio::test]
    async fn empty_audio_emits_nothing() {
        let engine = StubEngine::new("base");
        let results = engine
            .process(CancellationToken::new(), Vec::new(), Options::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn flush_resets_totals() {
        let engine = StubEngine::new("base");
        let cancel = CancellationToken::new();
        engine
            .process(cancel.clone(), vec![0u8; 10], Options::default())
            .await
            .unwrap();
        engine.flush(cancel.clone(), Options::default()).await.unwrap();

        let finals = engine.flush(cancel, Options::default()).await.unwrap();
        assert_eq!(finals[0].text, "[stub:base] total bytes 0");
    }

    #[tokio::test]
    async fn cancelled_process_emits_nothing() {
        let engine = StubEngine::new("base");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = engine
            .process(cancel, b"test".to_vec(), Options::default())
            .await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
