//! Top-level configuration
//!
//! One JSON document carries the platform family, an optional engine
//! preference, the engine configuration and the recovery policy. Every field
//! has a default, so `{}` is a valid configuration.

use crate::error::{Error, Result};
use crate::recovery::RecoveryConfig;
use crate::selector::SelectorOptions;
use crate::types::{EngineConfig, EngineKind, Platform};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub platform: Platform,
    pub preferred_engine: Option<EngineKind>,
    pub engine: EngineConfig,
    pub recovery: RecoveryConfig,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            platform: Platform::General,
            preferred_engine: None,
            engine: EngineConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl TunerConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut config: TunerConfig =
            serde_json::from_str(json).map_err(|e| Error::invalid_config(format!("invalid configuration: {}", e)))?;
        config.engine.platform = config.platform;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::invalid_config(format!("cannot read {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loading configuration");
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.engine.max_buffer_length.is_finite() || self.engine.max_buffer_length < 0.0 {
            return Err(Error::invalid_config(format!(
                "max_buffer_length must be a non-negative number, got {}",
                self.engine.max_buffer_length
            )));
        }
        self.recovery.validate()
    }

    pub fn selector_options(&self) -> SelectorOptions {
        SelectorOptions {
            platform: self.platform,
            preferred_engine: self.preferred_engine,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;

    #[test]
    fn test_empty_document_is_default() {
        let config = TunerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, TunerConfig::default());
    }

    #[test]
    fn test_nested_overrides() {
        let config = TunerConfig::from_json_str(
            r#"{
                "platform": "embedded",
                "preferred_engine": "embedded",
                "engine": { "auto_play": true, "preferred_audio_language": "de" },
                "recovery": { "max_attempts": 5 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.platform, Platform::Embedded);
        assert_eq!(config.engine.platform, Platform::Embedded);
        assert!(config.engine.auto_play);
        assert_eq!(config.recovery.max_attempts, 5);
        assert_eq!(config.recovery.initial_delay_ms, 1000);
        assert_eq!(config.selector_options().preferred_engine, Some(EngineKind::Embedded));
    }

    #[test]
    fn test_invalid_documents() {
        let err = TunerConfig::from_json_str(r#"{"platform": "mainframe"}"#).unwrap_err();
        assert_eq!(err.code, codes::INVALID_CONFIG);

        let err = TunerConfig::from_json_str(r#"{"recovery": {"backoff_multiplier": 0}}"#).unwrap_err();
        assert_eq!(err.code, codes::INVALID_CONFIG);

        let err = TunerConfig::from_json_str(r#"{"engine": {"max_buffer_length": -1}}"#).unwrap_err();
        assert_eq!(err.code, codes::INVALID_CONFIG);
    }

    #[test]
    fn test_missing_file() {
        let err = TunerConfig::from_file("/nonexistent/tuner.json").unwrap_err();
        assert_eq!(err.code, codes::INVALID_CONFIG);
    }
}
