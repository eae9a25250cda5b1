//! Environment loader
//!
//! Loads the JSON payload from `NUPI_ADAPTER_CONFIG`, applies individual
//! variable overrides, then validates. The lookup function is injectable so
//! tests run against deterministic maps instead of the process environment.

use crate::{Config, ConfigError};

const PAYLOAD_VAR: &str = "NUPI_ADAPTER_CONFIG";

/// Load configuration from the process environment.
pub fn load() -> Result<Config, ConfigError> {
    load_with(|key| std::env::var(key).ok())
}

/// Load configuration through the given lookup function.
pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
    let mut config = match lookup(PAYLOAD_VAR) {
        Some(raw) if !raw.trim().is_empty() => serde_json::from_str::<Config>(&raw)
            .map_err(|err| ConfigError::Payload(err.to_string()))?,
        _ => Config::default(),
    };

    override_string(&lookup, "NUPI_ADAPTER_LISTEN_ADDR", &mut config.listen_addr);
    override_string(&lookup, "NUPI_LOG_LEVEL", &mut config.log_level);
    override_string(&lookup, "NUPI_MODEL_VARIANT", &mut config.model_variant);
    override_string(&lookup, "NUPI_LANGUAGE_HINT", &mut config.language);
    override_string(&lookup, "NUPI_ADAPTER_DATA_DIR", &mut config.data_dir);
    override_string(&lookup, "NUPI_MODEL_PATH", &mut config.model_path);

    if let Some(value) = non_empty(&lookup, "NUPI_ADAPTER_USE_STUB_ENGINE") {
        config.use_stub_engine = parse_bool("NUPI_ADAPTER_USE_STUB_ENGINE", &value)?;
    }
    if let Some(value) = non_empty(&lookup, "WHISPERCPP_USE_GPU") {
        config.use_gpu = Some(parse_bool("WHISPERCPP_USE_GPU", &value)?);
    }
    if let Some(value) = non_empty(&lookup, "WHISPERCPP_FLASH_ATTENTION") {
        config.flash_attention = Some(parse_bool("WHISPERCPP_FLASH_ATTENTION", &value)?);
    }
    if let Some(value) = non_empty(&lookup, "WHISPERCPP_THREADS") {
        let threads = parse_int("WHISPERCPP_THREADS", &value)?;
        config.threads = (threads > 0).then_some(threads);
    }
    if let Some(value) = non_empty(&lookup, "WHISPERCPP_BEAM_SIZE") {
        let beam_size = parse_int("WHISPERCPP_BEAM_SIZE", &value)?;
        config.beam_size = (beam_size > 0).then_some(beam_size);
    }

    config.validate()?;
    Ok(config)
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn override_string(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut String) {
    if let Some(value) = non_empty(lookup, key) {
        *target = value;
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Ok(true),
        "0" | "f" | "false" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            key: key.to_string(),
            message: format!("expected a boolean, got {value:?}"),
        }),
    }
}

fn parse_int(key: &str, value: &str) -> Result<i32, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        message: format!("expected an integer, got {value:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(entries: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = load_with(|_| None).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:50051");
        assert_eq!(config.model_variant, "base");
        assert_eq!(config.language, "auto");
        assert_eq!(config.data_dir, "data");
        assert!(!config.use_stub_engine);
        assert_eq!(config.threads, None);
        assert_eq!(config.beam_size, None);
    }

    #[test]
    fn json_payload_applies() {
        let payload = r#"{
            "listen_addr": "0.0.0.0:9000",
            "model_variant": "small",
            "language": "pl",
            "use_stub_engine": true,
            "threads": 4,
            "step_ms": 1500
        }"#;
        let config = load_with(lookup_from(&[("NUPI_ADAPTER_CONFIG", payload)])).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.model_variant, "small");
        assert_eq!(config.language, "pl");
        assert!(config.use_stub_engine);
        assert_eq!(config.threads, Some(4));
        assert_eq!(config.step_ms, 1500);
        assert_eq!(config.length_ms, 10_000);
    }

    #[test]
    fn env_variables_override_payload() {
        let payload = r#"{"model_variant": "small", "language": "pl"}"#;
        let config = load_with(lookup_from(&[
            ("NUPI_ADAPTER_CONFIG", payload),
            ("NUPI_MODEL_VARIANT", "medium"),
            ("NUPI_LANGUAGE_HINT", "client"),
            ("WHISPERCPP_USE_GPU", "false"),
            ("WHISPERCPP_BEAM_SIZE", "5"),
        ]))
        .unwrap();
        assert_eq!(config.model_variant, "medium");
        assert_eq!(config.language, "client");
        assert_eq!(config.use_gpu, Some(false));
        assert_eq!(config.beam_size, Some(5));
    }

    #[test]
    fn malformed_payload_is_fatal() {
        let result = load_with(lookup_from(&[("NUPI_ADAPTER_CONFIG", "{not json")]));
        assert!(matches!(result, Err(ConfigError::Payload(_))));
    }

    #[test]
    fn invalid_bool_is_fatal() {
        let result = load_with(lookup_from(&[("NUPI_ADAPTER_USE_STUB_ENGINE", "maybe")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnv { ref key, .. }) if key == "NUPI_ADAPTER_USE_STUB_ENGINE"
        ));
    }

    #[test]
    fn invalid_int_is_fatal() {
        let result = load_with(lookup_from(&[("WHISPERCPP_THREADS", "lots")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnv { ref key, .. }) if key == "WHISPERCPP_THREADS"
        ));
    }

    #[test]
    fn non_positive_thread_override_clears() {
        let config = load_with(lookup_from(&[("WHISPERCPP_THREADS", "0")])).unwrap();
        assert_eq!(config.threads, None);
    }

    #[test]
    fn whitespace_values_are_ignored() {
        let config = load_with(lookup_from(&[("NUPI_MODEL_VARIANT", "   ")])).unwrap();
        assert_eq!(config.model_variant, "base");
    }
}
