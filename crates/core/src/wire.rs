//! Wire types for the bidirectional transcription stream
//!
//! Requests and transcripts travel as JSON frames; segment audio is
//! base64-encoded so a request stays a single text frame.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::audio::AudioFormat;

/// One inbound request on a transcription stream.
///
/// The opener must carry `metadata`; later requests may omit it. A request
/// either appends audio, flushes, or both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamTranscriptionRequest {
    pub session_id: String,
    pub stream_id: String,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Optional format descriptor; must describe pcm_s16le / 16000 Hz / mono.
    #[serde(default)]
    pub format: Option<AudioFormat>,

    #[serde(default)]
    pub segment: Option<AudioSegment>,

    #[serde(default)]
    pub flush: bool,
}

/// A chunk of PCM audio within a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSegment {
    pub sequence: u64,

    #[serde(with = "base64_bytes")]
    pub audio: Vec<u8>,

    #[serde(default)]
    pub last: bool,
}

/// One outbound transcript on a transcription stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Echoes the segment that triggered it; for pure-flush transcripts the
    /// last seen sequence, 0 if none.
    pub sequence: u64,

    pub text: String,

    pub confidence: f32,

    #[serde(rename = "final")]
    pub is_final: bool,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
