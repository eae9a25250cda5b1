//! Session dispatcher
//!
//! Consumes one bidirectional request stream, pushes audio segments into the
//! session's engine, and forwards transcripts in production order. Peer close
//! and cancellation both synthesise a terminal flush so every session that
//! accepted audio ends with at most one final transcript.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use whisper_adapter_config::Config;
use whisper_adapter_core::{transcript_metadata, StreamTranscriptionRequest, Transcript, TranscriptResult};
use whisper_adapter_engine::{Engine, Options};

use crate::telemetry::{Recorder, StreamMetrics};
use crate::ServerError;

/// Request metadata key carrying the caller's ISO 639-1 language hint.
pub const LANGUAGE_METADATA_KEY: &str = "nupi.lang.iso1";

/// Budget for the terminal flush synthesised on a cancelled stream.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Determine the effective language for a transcription stream.
///
/// The returned value is handed to the engine, which expects an ISO 639-1
/// code (e.g. "pl", "en", "de") or "auto" for auto-detection.
///
/// - `"client"`: use `nupi.lang.iso1` from metadata; fall back to `"auto"`.
/// - `"auto"`: always auto-detect, ignore metadata.
/// - other: ISO 639-1 code from config, passed verbatim (ignore metadata).
pub fn resolve_language(config_language: &str, metadata: &HashMap<String, String>) -> String {
    if config_language != "client" {
        return config_language.to_string();
    }
    match metadata
        .get(LANGUAGE_METADATA_KEY)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
    {
        Some(code) => code.to_string(),
        None => "auto".to_string(),
    }
}

/// Dispatcher for one transcription stream.
pub struct SessionDispatcher {
    cfg: Config,
    engine: Arc<dyn Engine>,
    recorder: Arc<Recorder>,
}

impl SessionDispatcher {
    pub fn new(cfg: Config, engine: Arc<dyn Engine>, recorder: Arc<Recorder>) -> Self {
        Self {
            cfg,
            engine,
            recorder,
        }
    }

    /// Drive the stream to completion.
    ///
    /// Returns when the peer flushes, closes, or an error occurs. Transcripts
    /// are sent in the order produced; no reordering.
    pub async fn run(
        &self,
        cancel: CancellationToken,
        mut requests: mpsc::Receiver<StreamTranscriptionRequest>,
        transcripts: mpsc::Sender<Transcript>,
    ) -> Result<(), ServerError> {
        let mut metrics: Option<StreamMetrics> = None;
        let result = self
            .run_stream(&cancel, &mut requests, &transcripts, &mut metrics)
            .await;
        if let Some(mut metrics) = metrics {
            metrics.finish(result.as_ref().err());
        }
        result
    }

    async fn run_stream(
        &self,
        cancel: &CancellationToken,
        requests: &mut mpsc::Receiver<StreamTranscriptionRequest>,
        transcripts: &mpsc::Sender<Transcript>,
        metrics: &mut Option<StreamMetrics>,
    ) -> Result<(), ServerError> {
        let mut session_id = String::new();
        let mut stream_id = String::new();
        let mut stream_lang = String::new();
        let mut last_sequence = 0u64;

        loop {
            let request = tokio::select! {
                _ = cancel.cancelled() => None,
                request = requests.recv() => request,
            };

            let Some(request) = request else {
                // Peer close or session cancellation. When anything was
                // accepted, synthesise a terminal flush on a short budget.
                if metrics.is_some() {
                    self.emit_flush(
                        self.close_flush_token(cancel),
                        transcripts,
                        &session_id,
                        &stream_id,
                        last_sequence,
                        &stream_lang,
                        metrics,
                        "stream closed",
                    )
                    .await?;
                }
                return Ok(());
            };

            if let Some(format) = &request.format {
                if !format.is_supported() {
                    return Err(ServerError::UnsupportedFormat(format!(
                        "{} / {} Hz / {} channel(s)",
                        format.encoding, format.sample_rate_hz, format.channels
                    )));
                }
            }

            if metrics.is_none() {
                *metrics = Some(self.recorder.start_stream(
                    &request.session_id,
                    &request.stream_id,
                    &request.metadata,
                ));
                stream_lang = resolve_language(&self.cfg.language, &request.metadata);
                session_id = request.session_id.clone();
                stream_id = request.stream_id.clone();
                tracing::info!(
                    session_id = %session_id,
                    stream_id = %stream_id,
                    metadata = ?request.metadata,
                    resolved_language = %stream_lang,
                    "stream opened"
                );
            }

            if let Some(segment) = &request.segment {
                last_sequence = segment.sequence;

                if !segment.audio.is_empty() {
                    let final_requested = request.flush || segment.last;
                    if let Some(metrics) = metrics.as_mut() {
                        metrics.record_segment(segment.sequence, segment.audio.len(), final_requested);
                    }

                    let started = Instant::now();
                    let outcome = self
                        .engine
                        .process(
                            cancel.clone(),
                            segment.audio.clone(),
                            Options {
                                language: stream_lang.clone(),
                                is_final: final_requested,
                                sequence: segment.sequence,
                            },
                        )
                        .await;

                    let results = match outcome {
                        Ok(results) => results,
                        Err(err) if err.is_cancelled() => {
                            // Stop reading this stream; attempt a terminal
                            // flush on a short budget.
                            self.emit_flush(
                                self.close_flush_token(cancel),
                                transcripts,
                                &session_id,
                                &stream_id,
                                last_sequence,
                                &stream_lang,
                                metrics,
                                "stream closed",
                            )
                            .await?;
                            return Ok(());
                        }
                        Err(err) => {
                            tracing::error!(
                                session_id = %session_id,
                                stream_id = %stream_id,
                                sequence = segment.sequence,
                                error = %err,
                                "engine segment failure"
                            );
                            return Err(ServerError::Engine(err));
                        }
                    };
                    if let Some(metrics) = metrics.as_mut() {
                        metrics.record_inference_duration(started.elapsed());
                    }

                    for (index, result) in results.iter().enumerate() {
                        tracing::info!(
                            session_id = %session_id,
                            stream_id = %stream_id,
                            sequence = segment.sequence,
                            index,
                            text = %result.text,
                            confidence = result.confidence,
                            is_final = result.is_final,
                            "engine segment result"
                        );
                    }
                    self.send_results(transcripts, segment.sequence, &results, &stream_lang, metrics)
                        .await?;
                }
            }

            if request.flush {
                self.emit_flush(
                    cancel.clone(),
                    transcripts,
                    &session_id,
                    &stream_id,
                    last_sequence,
                    &stream_lang,
                    metrics,
                    "stream flushed",
                )
                .await?;
                return Ok(());
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn emit_flush(
        &self,
        cancel: CancellationToken,
        transcripts: &mpsc::Sender<Transcript>,
        session_id: &str,
        stream_id: &str,
        sequence: u64,
        language: &str,
        metrics: &mut Option<StreamMetrics>,
        reason: &str,
    ) -> Result<(), ServerError> {
        if let Some(metrics) = metrics.as_mut() {
            metrics.record_flush();
        }

        let started = Instant::now();
        let results = match self
            .engine
            .flush(
                cancel,
                Options {
                    language: language.to_string(),
                    is_final: true,
                    sequence,
                },
            )
            .await
        {
            Ok(results) => results,
            Err(err) => {
                tracing::error!(
                    session_id = %session_id,
                    stream_id = %stream_id,
                    error = %err,
                    "engine flush failure"
                );
                return Err(ServerError::Engine(err));
            }
        };
        if let Some(metrics) = metrics.as_mut() {
            metrics.record_inference_duration(started.elapsed());
        }

        for (index, result) in results.iter().enumerate() {
            tracing::info!(
                session_id = %session_id,
                stream_id = %stream_id,
                sequence,
                index,
                text = %result.text,
                confidence = result.confidence,
                is_final = result.is_final,
                "engine flush result"
            );
        }
        self.send_results(transcripts, sequence, &results, language, metrics)
            .await?;

        tracing::info!(session_id = %session_id, stream_id = %stream_id, sequence, "{}", reason);
        Ok(())
    }

    /// Token budgeting the terminal flush: the live session token while it is
    /// still valid, a fresh deadline token once the session was cancelled.
    fn close_flush_token(&self, cancel: &CancellationToken) -> CancellationToken {
        if !cancel.is_cancelled() {
            return cancel.clone();
        }
        let token = CancellationToken::new();
        let deadline = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(CLOSE_FLUSH_TIMEOUT).await;
            deadline.cancel();
        });
        token
    }

    async fn send_results(
        &self,
        transcripts: &mpsc::Sender<Transcript>,
        sequence: u64,
        results: &[TranscriptResult],
        language: &str,
        metrics: &mut Option<StreamMetrics>,
    ) -> Result<(), ServerError> {
        for result in results {
            if let Some(metrics) = metrics.as_mut() {
                metrics.record_transcript(sequence, &result.text, result.is_final);
            }
            let transcript = Transcript {
                sequence,
                text: result.text.clone(),
                confidence: result.confidence,
                is_final: result.is_final,
                metadata: transcript_metadata(&self.cfg.model_variant, language),
            };
            transcripts
                .send(transcript)
                .await
                .map_err(|_| ServerError::Transport("transcript channel closed".to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use whisper_adapter_core::{AudioFormat, AudioSegment};
    use whisper_adapter_engine::StubEngine;

    fn dispatcher(cfg: Config) -> SessionDispatcher {
        let variant = cfg.model_variant.clone();
        SessionDispatcher::new(
            cfg,
            Arc::new(StubEngine::new(&variant)),
            Arc::new(Recorder::new()),
        )
    }

    fn opener(segment: Option<AudioSegment>, flush: bool) -> StreamTranscriptionRequest {
        StreamTranscriptionRequest {
            session_id: "session-1".to_string(),
            stream_id: "stream-1".to_string(),
            metadata: HashMap::new(),
            format: None,
            segment,
            flush,
        }
    }

    fn segment(sequence: u64, audio: &[u8], last: bool) -> AudioSegment {
        AudioSegment {
            sequence,
            audio: audio.to_vec(),
            last,
        }
    }

    #[test]
    fn resolves_client_language_from_metadata() {
        let metadata = HashMap::from([(LANGUAGE_METADATA_KEY.to_string(), "  pl  ".to_string())]);
        assert_eq!(resolve_language("client", &metadata), "pl");
    }

    #[test]
    fn client_language_falls_back_to_auto() {
        assert_eq!(resolve_language("client", &HashMap::new()), "auto");

        let blank = HashMap::from([(LANGUAGE_METADATA_KEY.to_string(), "   ".to_string())]);
        assert_eq!(resolve_language("client", &blank), "auto");
    }

    #[test]
    fn forced_language_ignores_metadata() {
        let metadata = HashMap::from([(LANGUAGE_METADATA_KEY.to_string(), "pl".to_string())]);
        assert_eq!(resolve_language("de", &metadata), "de");
        assert_eq!(resolve_language("auto", &metadata), "auto");
    }

    #[tokio::test]
    async fn stub_round_trip_in_order() {
        let cfg = Config {
            model_variant: "small".to_string(),
            ..Config::default()
        };
        let dispatcher = dispatcher(cfg);

        let (request_tx, request_rx) = mpsc::channel(8);
        let (transcript_tx, mut transcript_rx) = mpsc::channel(8);

        request_tx
            .send(opener(Some(segment(1, b"test", false)), false))
            .await
            .unwrap();
        request_tx.send(opener(None, true)).await.unwrap();
        drop(request_tx);

        dispatcher
            .run(CancellationToken::new(), request_rx, transcript_tx)
            .await
            .unwrap();

        let partial = transcript_rx.recv().await.unwrap();
        assert_eq!(partial.sequence, 1);
        assert_eq!(partial.text, "[stub:small] received 4 bytes");
        assert!((partial.confidence - 0.42).abs() < 1e-6);
        assert!(!partial.is_final);
        assert_eq!(
            partial.metadata.get("generator").map(String::as_str),
            Some("stt-local-whisper")
        );
        assert_eq!(
            partial.metadata.get("model_variant").map(String::as_str),
            Some("small")
        );
        assert_eq!(
            partial.metadata.get("language").map(String::as_str),
            Some("auto")
        );

        let last = transcript_rx.recv().await.unwrap();
        assert_eq!(last.sequence, 1);
        assert_eq!(last.text, "[stub:small] total bytes 4");
        assert!((last.confidence - 1.0).abs() < 1e-6);
        assert!(last.is_final);

        assert!(transcript_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn client_metadata_language_reaches_transcripts() {
        let cfg = Config {
            language: "client".to_string(),
            ..Config::default()
        };
        let dispatcher = dispatcher(cfg);

        let (request_tx, request_rx) = mpsc::channel(8);
        let (transcript_tx, mut transcript_rx) = mpsc::channel(8);

        let mut request = opener(Some(segment(1, b"abc", false)), true);
        request.metadata =
            HashMap::from([(LANGUAGE_METADATA_KEY.to_string(), " pl ".to_string())]);
        request_tx.send(request).await.unwrap();
        drop(request_tx);

        dispatcher
            .run(CancellationToken::new(), request_rx, transcript_tx)
            .await
            .unwrap();

        let partial = transcript_rx.recv().await.unwrap();
        assert_eq!(partial.metadata.get("language").map(String::as_str), Some("pl"));
    }

    #[tokio::test]
    async fn peer_close_synthesises_terminal_flush() {
        let dispatcher = dispatcher(Config::default());

        let (request_tx, request_rx) = mpsc::channel(8);
        let (transcript_tx, mut transcript_rx) = mpsc::channel(8);

        request_tx
            .send(opener(Some(segment(3, b"audio", false)), false))
            .await
            .unwrap();
        drop(request_tx);

        dispatcher
            .run(CancellationToken::new(), request_rx, transcript_tx)
            .await
            .unwrap();

        let partial = transcript_rx.recv().await.unwrap();
        assert!(!partial.is_final);

        let last = transcript_rx.recv().await.unwrap();
        assert!(last.is_final);
        assert_eq!(last.sequence, 3);
        assert_eq!(last.text, "[stub:base] total bytes 5");
    }

    #[tokio::test]
    async fn unopened_stream_closes_without_flush() {
        let dispatcher = dispatcher(Config::default());

        let (request_tx, request_rx) = mpsc::channel::<StreamTranscriptionRequest>(8);
        let (transcript_tx, mut transcript_rx) = mpsc::channel(8);
        drop(request_tx);

        dispatcher
            .run(CancellationToken::new(), request_rx, transcript_tx)
            .await
            .unwrap();

        assert!(transcript_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn unsupported_format_is_rejected() {
        let dispatcher = dispatcher(Config::default());

        let (request_tx, request_rx) = mpsc::channel(8);
        let (transcript_tx, _transcript_rx) = mpsc::channel(8);

        let mut request = opener(Some(segment(1, b"audio", false)), false);
        request.format = Some(AudioFormat {
            encoding: "opus".to_string(),
            sample_rate_hz: 48_000,
            channels: 2,
        });
        request_tx.send(request).await.unwrap();
        drop(request_tx);

        let result = dispatcher
            .run(CancellationToken::new(), request_rx, transcript_tx)
            .await;
        assert!(matches!(result, Err(ServerError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn flush_only_stream_uses_sequence_zero() {
        let cfg = Config {
            model_variant: "small".to_string(),
            ..Config::default()
        };
        let dispatcher = dispatcher(cfg);

        let (request_tx, request_rx) = mpsc::channel(8);
        let (transcript_tx, mut transcript_rx) = mpsc::channel(8);

        request_tx.send(opener(None, true)).await.unwrap();
        drop(request_tx);

        dispatcher
            .run(CancellationToken::new(), request_rx, transcript_tx)
            .await
            .unwrap();

        let last = transcript_rx.recv().await.unwrap();
        assert_eq!(last.sequence, 0);
        assert_eq!(last.text, "[stub:small] total bytes 0");
        assert!(last.is_final);
    }

    #[tokio::test]
    async fn cancelled_session_still_flushes_accepted_audio() {
        let dispatcher = dispatcher(Config::default());

        let (request_tx, request_rx) = mpsc::channel(8);
        let (transcript_tx, mut transcript_rx) = mpsc::channel(8);

        request_tx
            .send(opener(Some(segment(1, b"audio", false)), false))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let run = {
            let cancel = cancel.clone();
            let dispatcher = Arc::new(dispatcher);
            let handle = dispatcher.clone();
            tokio::spawn(async move { handle.run(cancel, request_rx, transcript_tx).await })
        };

        // Let the segment result arrive, then cancel the session.
        let partial = transcript_rx.recv().await.unwrap();
        assert!(!partial.is_final);
        cancel.cancel();

        run.await.unwrap().unwrap();

        let last = transcript_rx.recv().await.unwrap();
        assert!(last.is_final);
        assert_eq!(last.text, "[stub:base] total bytes 5");
    }
}
