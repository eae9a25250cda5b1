//! Static adapter identity
//!
//! Centralising these values makes it easy to clone this repository for new
//! adapters.

use std::collections::HashMap;

/// Static identifiers for the adapter.
#[derive(Debug, Clone, Copy)]
pub struct AdapterInfo {
    pub name: &'static str,
    pub binary_name: &'static str,
    pub slug: &'static str,
    pub description: &'static str,
    pub generator_id: &'static str,
}

/// The current adapter.
pub const ADAPTER: AdapterInfo = AdapterInfo {
    name: "Nupi Whisper Local STT",
    binary_name: "whisper-adapter",
    slug: "stt-local-whisper",
    description: "Local speech-to-text adapter backed by Whisper.",
    generator_id: "stt-local-whisper",
};

/// Standard metadata payload attached to every emitted transcript.
pub fn transcript_metadata(model_variant: &str, language: &str) -> HashMap<String, String> {
    HashMap::from([
        ("generator".to_string(), ADAPTER.generator_id.to_string()),
        ("model_variant".to_string(), model_variant.to_string()),
        ("language".to_string(), language.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_carries_generator_and_language() {
        let meta = transcript_metadata("base", "pl");
        assert_eq!(meta.get("generator").map(String::as_str), Some("stt-local-whisper"));
        assert_eq!(meta.get("model_variant").map(String::as_str), Some("base"));
        assert_eq!(meta.get("language").map(String::as_str), Some("pl"));
    }
}
