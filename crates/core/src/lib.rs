//! Core types shared across the whisper adapter crates
//!
//! This crate provides the foundational pieces used everywhere else:
//! - Wire types for the bidirectional transcription stream
//! - Audio format validation and PCM helpers
//! - Transcript result type
//! - Static adapter identity

pub mod adapter;
pub mod audio;
pub mod transcript;
pub mod wire;

pub use adapter::{transcript_metadata, AdapterInfo, ADAPTER};
pub use audio::{pcm_to_f32, samples_from_ms, AudioFormat, SAMPLE_RATE_HZ};
pub use transcript::TranscriptResult;
pub use wire::{AudioSegment, StreamTranscriptionRequest, Transcript};
