//! Transcript result emitted by the engines

/// A transcript produced by an engine for one window or flush.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptResult {
    /// Transcribed text, trimmed and non-empty when emitted.
    pub text: String,

    /// Mean token probability of the window, 0 when unknown.
    pub confidence: f32,

    /// Whether this is the single final result of the session.
    pub is_final: bool,
}

impl TranscriptResult {
    /// Create a partial (non-final) transcript.
    pub fn partial(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            is_final: false,
        }
    }

    /// Create the final transcript of a session.
    pub fn final_result(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            is_final: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_finality() {
        assert!(!TranscriptResult::partial("hello", 0.5).is_final);
        assert!(TranscriptResult::final_result("hello", 0.5).is_final);
    }
}
