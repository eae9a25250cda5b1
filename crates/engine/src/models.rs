//! Model artefact resolution
//!
//! Maps a model variant to a file under the data directory, with an explicit
//! path override that bypasses resolution. Download and checksum handling
//! belong to the surrounding platform; by the time an engine opens, the file
//! must already exist.

use std::path::{Path, PathBuf};

use crate::error::EngineError;

pub struct ModelResolver {
    data_dir: PathBuf,
}

impl ModelResolver {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Resolve the model file for `variant`, or `override_path` when set.
    pub fn resolve(&self, variant: &str, override_path: &str) -> Result<PathBuf, EngineError> {
        let override_path = override_path.trim();
        if !override_path.is_empty() {
            return ensure_file(PathBuf::from(override_path));
        }

        let variant = variant.trim();
        if variant.is_empty() {
            return Err(EngineError::InvalidInput(
                "model variant is required".to_string(),
            ));
        }
        ensure_file(self.data_dir.join(format!("ggml-{variant}.bin")))
    }
}

fn ensure_file(path: PathBuf) -> Result<PathBuf, EngineError> {
    if Path::is_file(&path) {
        Ok(path)
    } else {
        Err(EngineError::Model(format!(
            "model file not found: {}",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variant_file_is_an_error() {
        let resolver = ModelResolver::new("does-not-exist");
        let err = resolver.resolve("base", "").unwrap_err();
        assert!(err.to_string().contains("ggml-base.bin"));
    }

    #[test]
    fn empty_variant_is_invalid() {
        let resolver = ModelResolver::new("data");
        assert!(matches!(
            resolver.resolve("  ", ""),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn override_bypasses_data_dir() {
        let path = std::env::temp_dir().join(format!("whisper-adapter-test-{}.bin", std::process::id()));
        std::fs::write(&path, b"model").unwrap();

        let resolver = ModelResolver::new("does-not-exist");
        let resolved = resolver
            .resolve("base", path.to_str().unwrap())
            .unwrap();
        assert_eq!(resolved, path);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_override_is_an_error() {
        let resolver = ModelResolver::new("data");
        let err = resolver.resolve("base", "/nope/model.bin").unwrap_err();
        assert!(matches!(err, EngineError::Model(_)));
    }
}
