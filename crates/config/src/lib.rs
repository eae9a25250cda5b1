//! Adapter configuration
//!
//! Bootstrap configuration arrives from the environment: a JSON payload in
//! `NUPI_ADAPTER_CONFIG` plus individual variable overrides. Malformed values
//! are startup-fatal; there is no silent recovery.

mod loader;

pub use loader::{load, load_with};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:50051";
pub const DEFAULT_MODEL: &str = "base";
pub const DEFAULT_LANGUAGE: &str = "auto";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_DATA_DIR: &str = "data";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config: decode NUPI_ADAPTER_CONFIG: {0}")]
    Payload(String),

    #[error("config: invalid value for {key}: {message}")]
    InvalidEnv { key: String, message: String },

    #[error("config: {0}")]
    Invalid(String),
}

/// Adapter configuration.
///
/// `language` selects the stream language policy: `"client"` reads the hint
/// from request metadata, `"auto"` always auto-detects, anything else is an
/// ISO 639-1 code passed verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub model_variant: String,
    pub language: String,
    pub log_level: String,
    pub data_dir: String,

    /// Absolute path to the model artefact; bypasses variant resolution.
    pub model_path: String,
    pub use_stub_engine: bool,

    pub use_gpu: Option<bool>,
    pub flash_attention: Option<bool>,
    pub threads: Option<i32>,
    pub beam_size: Option<i32>,

    pub translate: bool,
    pub keep_context: bool,
    pub temperature_inc: f32,
    pub disable_fallback: bool,
    pub max_tokens: u32,
    pub audio_ctx: u32,

    pub use_vad: bool,
    pub vad_threshold: f32,
    pub freq_threshold: f32,

    pub step_ms: u32,
    pub length_ms: u32,
    pub keep_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            model_variant: DEFAULT_MODEL.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            data_dir: DEFAULT_DATA_DIR.to_string(),
            model_path: String::new(),
            use_stub_engine: false,
            use_gpu: None,
            flash_attention: None,
            threads: None,
            beam_size: None,
            translate: false,
            keep_context: true,
            temperature_inc: 0.2,
            disable_fallback: false,
            max_tokens: 0,
            audio_ctx: 0,
            use_vad: false,
            vad_threshold: 0.6,
            freq_threshold: 100.0,
            step_ms: 3000,
            length_ms: 10_000,
            keep_ms: 200,
        }
    }
}

impl Config {
    /// Apply defaults for empty fields and reject out-of-range values.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.listen_addr.is_empty() {
            return Err(ConfigError::Invalid("listen address is required".to_string()));
        }
        if self.model_variant.is_empty() {
            self.model_variant = DEFAULT_MODEL.to_string();
        }
        if self.language.is_empty() {
            self.language = DEFAULT_LANGUAGE.to_string();
        }
        if self.language.len() > 8 {
            return Err(ConfigError::Invalid(format!(
                "language must be at most 8 characters, got {:?}",
                self.language
            )));
        }
        if self.log_level.is_empty() {
            self.log_level = DEFAULT_LOG_LEVEL.to_string();
        }
        if self.data_dir.is_empty() {
            self.data_dir = DEFAULT_DATA_DIR.to_string();
        }
        if let Some(threads) = self.threads {
            if threads < 0 {
                return Err(ConfigError::Invalid(format!(
                    "threads must be >= 0, got {threads}"
                )));
            }
        }
        if let Some(beam_size) = self.beam_size {
            if beam_size < 1 {
                return Err(ConfigError::Invalid(format!(
                    "beam_size must be >= 1, got {beam_size}"
                )));
            }
        }
        if self.length_ms == 0 {
            return Err(ConfigError::Invalid("length_ms must be > 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = Config::default();
        assert_eq!(config.listen_addr, "127.0.0.1:50051");
        assert_eq!(config.model_variant, "base");
        assert_eq!(config.language, "auto");
        assert_eq!(config.data_dir, "data");
        assert!(!config.use_stub_engine);
        assert_eq!(config.threads, None);
        assert_eq!(config.beam_size, None);
        assert_eq!(config.step_ms, 3000);
        assert_eq!(config.length_ms, 10_000);
        assert_eq!(config.keep_ms, 200);
        assert!((config.vad_threshold - 0.6).abs() < f32::EPSILON);
        assert!((config.freq_threshold - 100.0).abs() < f32::EPSILON);
    }

    #[test]
    fn validate_fills_empty_fields() {
        let mut config = Config {
            model_variant: String::new(),
            language: String::new(),
            log_level: String::new(),
            data_dir: String::new(),
            ..Config::default()
        };
        config.validate().unwrap();
        assert_eq!(config.model_variant, "base");
        assert_eq!(config.language, "auto");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.data_dir, "data");
    }

    #[test]
    fn validate_rejects_out_of_range() {
        let mut config = Config {
            threads: Some(-1),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let mut config = Config {
            beam_size: Some(0),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let mut config = Config {
            language: "verylonglanguage".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let mut config = Config {
            listen_addr: String::new(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
