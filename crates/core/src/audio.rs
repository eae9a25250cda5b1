//! Audio format validation and PCM helpers
//!
//! The adapter accepts exactly one input format: mono little-endian signed
//! 16-bit PCM at 16 kHz. The engine never resamples.

use serde::{Deserialize, Serialize};

/// Sample rate every stream must use.
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// Encoding label for little-endian signed 16-bit PCM.
pub const ENCODING_PCM_S16LE: &str = "pcm_s16le";

/// Audio format descriptor carried on stream requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub encoding: String,
    pub sample_rate_hz: u32,
    pub channels: u16,
}

impl AudioFormat {
    /// Whether the descriptor matches the only format the engine accepts.
    pub fn is_supported(&self) -> bool {
        self.encoding.eq_ignore_ascii_case(ENCODING_PCM_S16LE)
            && self.sample_rate_hz == SAMPLE_RATE_HZ
            && self.channels == 1
    }
}

/// Number of samples covered by `ms` milliseconds of audio.
pub fn samples_from_ms(ms: u32) -> usize {
    (SAMPLE_RATE_HZ as u64 * ms as u64 / 1000) as usize
}

/// Convert PCM16LE bytes to normalised f32 samples in [-1, 1].
///
/// A trailing odd byte is ignored.
pub fn pcm_to_f32(buf: &[u8]) -> Vec<f32> {
    buf.chunks_exact(2)
        .map(|chunk| {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            sample as f32 / 32768.0
        })
        .collect()
}
