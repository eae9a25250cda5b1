//! Per-stream telemetry
//!
//! Tracks adapter totals on atomics and logs a per-stream summary when a
//! stream finishes. Totals are also published through the `metrics` facade
//! and rendered by the `/metrics` endpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::ServerError;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Safe to call more than once; the first
/// installation wins.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    if METRICS_HANDLE.get().is_none() {
        if let Ok(handle) = PrometheusBuilder::new().install_recorder() {
            let _ = METRICS_HANDLE.set(handle);
        }
    }
    METRICS_HANDLE.get()
}

pub fn metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Adapter-level totals.
pub struct Recorder {
    total_streams: AtomicU64,
    active_streams: AtomicI64,
    total_segments: AtomicU64,
    total_bytes: AtomicU64,
    total_transcripts: AtomicU64,
    total_final_transcripts: AtomicU64,
    total_flushes: AtomicU64,
}

/// Immutable view of the recorder totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub total_streams: u64,
    pub active_streams: i64,
    pub total_segments: u64,
    pub total_bytes: u64,
    pub total_transcripts: u64,
    pub total_final_transcripts: u64,
    pub total_flushes: u64,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            total_streams: AtomicU64::new(0),
            active_streams: AtomicI64::new(0),
            total_segments: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            total_transcripts: AtomicU64::new(0),
            total_final_transcripts: AtomicU64::new(0),
            total_flushes: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            total_streams: self.total_streams.load(Ordering::Relaxed),
            active_streams: self.active_streams.load(Ordering::Relaxed),
            total_segments: self.total_segments.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            total_transcripts: self.total_transcripts.load(Ordering::Relaxed),
            total_final_transcripts: self.total_final_transcripts.load(Ordering::Relaxed),
            total_flushes: self.total_flushes.load(Ordering::Relaxed),
        }
    }

    /// Begin tracking one transcription stream.
    pub fn start_stream(
        self: &Arc<Self>,
        session_id: &str,
        stream_id: &str,
        metadata: &HashMap<String, String>,
    ) -> StreamMetrics {
        self.total_streams.fetch_add(1, Ordering::Relaxed);
        let active = self.active_streams.fetch_add(1, Ordering::Relaxed) + 1;

        counter!("stt_adapter_streams_total").increment(1);
        gauge!("stt_adapter_streams_active").set(active as f64);

        if !metadata.is_empty() {
            tracing::debug!(
                session_id = %session_id,
                stream_id = %stream_id,
                metadata = ?metadata,
                "stream metrics opened"
            );
        }

        StreamMetrics {
            recorder: self.clone(),
            session_id: session_id.to_string(),
            stream_id: stream_id.to_string(),
            started: Instant::now(),
            segments: 0,
            bytes: 0,
            transcripts: 0,
            final_transcripts: 0,
            flushes: 0,
            inference_time: Duration::ZERO,
            finished: false,
        }
    }
}

/// Statistics for a single transcription stream.
pub struct StreamMetrics {
    recorder: Arc<Recorder>,
    session_id: String,
    stream_id: String,

    started: Instant,
    segments: u64,
    bytes: u64,
    transcripts: u64,
    final_transcripts: u64,
    flushes: u64,
    inference_time: Duration,
    finished: bool,
}

impl StreamMetrics {
    pub fn record_segment(&mut self, sequence: u64, size: usize, is_final: bool) {
        if size == 0 {
            return;
        }
        self.segments += 1;
        self.bytes += size as u64;
        self.recorder.total_segments.fetch_add(1, Ordering::Relaxed);
        self.recorder
            .total_bytes
            .fetch_add(size as u64, Ordering::Relaxed);

        counter!("stt_adapter_segments_total").increment(1);
        counter!("stt_adapter_audio_bytes_total").increment(size as u64);

        tracing::debug!(
            session_id = %self.session_id,
            stream_id = %self.stream_id,
            sequence,
            bytes = size,
            is_final,
            "segment received"
        );
    }

    pub fn record_transcript(&mut self, sequence: u64, text: &str, is_final: bool) {
        self.transcripts += 1;
        self.recorder
            .total_transcripts
            .fetch_add(1, Ordering::Relaxed);
        if is_final {
            self.final_transcripts += 1;
            self.recorder
                .total_final_transcripts
                .fetch_add(1, Ordering::Relaxed);
        }

        counter!("stt_adapter_transcripts_total").increment(1);

        tracing::debug!(
            session_id = %self.session_id,
            stream_id = %self.stream_id,
            sequence,
            is_final,
            chars = text.len(),
            runes = text.chars().count(),
            "transcript emitted"
        );
    }

    pub fn record_flush(&mut self) {
        self.flushes += 1;
        self.recorder.total_flushes.fetch_add(1, Ordering::Relaxed);
        counter!("stt_adapter_flushes_total").increment(1);
    }

    pub fn record_inference_duration(&mut self, duration: Duration) {
        self.inference_time += duration;
        histogram!("stt_adapter_inference_duration_seconds").record(duration.as_secs_f64());
    }

    /// Log the stream summary and release the active slot. Idempotent.
    pub fn finish(&mut self, error: Option<&ServerError>) {
        if self.finished {
            return;
        }
        self.finished = true;

        let active = self.recorder.active_streams.fetch_sub(1, Ordering::Relaxed) - 1;
        gauge!("stt_adapter_streams_active").set(active as f64);

        let duration_ms = self.started.elapsed().as_millis() as u64;
        match error {
            Some(err) => tracing::error!(
                session_id = %self.session_id,
                stream_id = %self.stream_id,
                duration_ms,
                segments = self.segments,
                bytes = self.bytes,
                transcripts = self.transcripts,
                final_transcripts = self.final_transcripts,
                flushes = self.flushes,
                inference_ms = self.inference_time.as_millis() as u64,
                error = %err,
                "stream completed with error"
            ),
            None => tracing::info!(
                session_id = %self.session_id,
                stream_id = %self.stream_id,
                duration_ms,
                segments = self.segments,
                bytes = self.bytes,
                transcripts = self.transcripts,
                final_transcripts = self.final_transcripts,
                flushes = self.flushes,
                inference_ms = self.inference_time.as_millis() as u64,
                "stream completed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_accumulate_across_streams() {
        let recorder = Arc::new(Recorder::new());

        let mut first = recorder.start_stream("s1", "t1", &HashMap::new());
        first.record_segment(1, 100, false);
        first.record_transcript(1, "hello", false);
        first.record_flush();
        first.finish(None);

        let mut second = recorder.start_stream("s2", "t2", &HashMap::new());
        second.record_segment(1, 50, true);
        second.record_transcript(1, "world", true);
        second.finish(None);

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.total_streams, 2);
        assert_eq!(snapshot.active_streams, 0);
        assert_eq!(snapshot.total_segments, 2);
        assert_eq!(snapshot.total_bytes, 150);
        assert_eq!(snapshot.total_transcripts, 2);
        assert_eq!(snapshot.total_final_transcripts, 1);
        assert_eq!(snapshot.total_flushes, 1);
    }

    #[test]
    fn finish_is_idempotent() {
        let recorder = Arc::new(Recorder::new());
        let mut metrics = recorder.start_stream("s", "t", &HashMap::new());
        metrics.finish(None);
        metrics.finish(None);
        assert_eq!(recorder.snapshot().active_streams, 0);
    }

    #[test]
    fn empty_segments_are_not_counted() {
        let recorder = Arc::new(Recorder::new());
        let mut metrics = recorder.start_stream("s", "t", &HashMap::new());
        metrics.record_segment(1, 0, false);
        metrics.finish(None);
        assert_eq!(recorder.snapshot().total_segments, 0);
    }
}
