//! Engine construction
//!
//! Resolves the configured model and returns an engine instance. Every
//! failure lands on the stub engine so the adapter stays serviceable; the
//! underlying error travels alongside as a warning for the caller to log.

use std::path::PathBuf;
use std::sync::Arc;

use whisper_adapter_config::Config;

use crate::error::EngineError;
use crate::models::ModelResolver;
use crate::stub::StubEngine;
use crate::{native_available, Engine};

/// A constructed engine plus how it came to be.
pub struct EngineHandle {
    pub engine: Arc<dyn Engine>,
    pub model_path: Option<PathBuf>,
    /// Set when construction fell back to the stub engine.
    pub warning: Option<EngineError>,
}

/// Build an engine for the given configuration.
pub fn build(cfg: &Config) -> EngineHandle {
    if cfg.use_stub_engine {
        tracing::warn!("stub engine forced by configuration");
        let mut model_path = None;
        let mut warning = None;
        if !cfg.model_path.trim().is_empty() {
            match ModelResolver::new(&cfg.data_dir).resolve(&cfg.model_variant, &cfg.model_path) {
                Ok(path) => model_path = Some(path),
                Err(err) => warning = Some(err),
            }
        }
        return EngineHandle {
            engine: Arc::new(StubEngine::new(&cfg.model_variant)),
            model_path,
            warning,
        };
    }

    let resolver = ModelResolver::new(&cfg.data_dir);
    let model_path = match resolver.resolve(&cfg.model_variant, &cfg.model_path) {
        Ok(path) => path,
        Err(err) => {
            tracing::warn!(error = %err, "model resolution failed; using stub engine");
            return EngineHandle {
                engine: Arc::new(StubEngine::new(&cfg.model_variant)),
                model_path: None,
                warning: Some(err),
            };
        }
    };

    if !native_available() {
        tracing::warn!(
            model_path = %model_path.display(),
            "native backend disabled at build time; using stub engine"
        );
        return EngineHandle {
            engine: Arc::new(StubEngine::new(&cfg.model_variant)),
            model_path: Some(model_path),
            warning: Some(EngineError::Model(
                "native backend unavailable".to_string(),
            )),
        };
    }

    open_native(cfg, model_path)
}

#[cfg(feature = "whisper")]
fn open_native(cfg: &Config, model_path: PathBuf) -> EngineHandle {
    use crate::native::NativeEngine;
    use crate::NativeOptions;

    match NativeEngine::open(&model_path, &NativeOptions::from_config(cfg)) {
        Ok(engine) => {
            tracing::info!(model_path = %model_path.display(), "native engine ready");
            EngineHandle {
                engine: Arc::new(engine),
                model_path: Some(model_path),
                warning: None,
            }
        }
        Err(err) => {
            tracing::error!(
                error = %err,
                model_path = %model_path.display(),
                "native engine initialisation failed; using stub"
            );
            EngineHandle {
                engine: Arc::new(StubEngine::new(&cfg.model_variant)),
                model_path: Some(model_path),
                warning: Some(err),
            }
        }
    }
}

#[cfg(not(feature = "whisper"))]
fn open_native(cfg: &Config, model_path: PathBuf) -> EngineHandle {
    EngineHandle {
        engine: Arc::new(StubEngine::new(&cfg.model_variant)),
        model_path: Some(model_path),
        warning: Some(EngineError::Model(
            "native backend unavailable".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_stub_has_no_warning_without_model_path() {
        let cfg = Config {
            use_stub_engine: true,
            ..Config::default()
        };
        let handle = build(&cfg);
        assert!(handle.warning.is_none());
        assert!(handle.model_path.is_none());
    }

    #[test]
    fn missing_model_falls_back_to_stub_with_warning() {
        let cfg = Config {
            data_dir: "does-not-exist".to_string(),
            ..Config::default()
        };
        let handle = build(&cfg);
        assert!(handle.warning.is_some());
        assert!(handle.model_path.is_none());
    }
}
