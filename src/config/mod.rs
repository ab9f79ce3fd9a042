//! Configuration management for Parley
//!
//! Configuration is loaded from `~/.parley/config.json` with environment variable overrides.

mod types;
pub mod validate;

pub use types::*;

use crate::error::{ParleyError, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use validate::DiagnosticLevel;

impl Config {
    /// Returns the Parley configuration directory path (~/.parley)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".parley")
    }

    /// Returns the path to the config file (~/.parley/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    /// Environment variables can override config values using the pattern:
    /// `PARLEY_SECTION_KEY`
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Directory holding durable conversation snapshots.
    pub fn storage_dir(&self) -> PathBuf {
        match &self.storage.path {
            Some(path) => PathBuf::from(path),
            None => Self::dir().join("conversations"),
        }
    }

    /// Reject configurations the gateway cannot run with.
    ///
    /// Warnings are returned as formatted strings; the first error aborts.
    pub fn validate(&self) -> Result<Vec<String>> {
        let diagnostics = validate::validate_values(self);
        if let Some(err) = diagnostics
            .iter()
            .find(|d| d.level == DiagnosticLevel::Error)
        {
            return Err(ParleyError::Config(format!("{}: {}", err.path, err.message)));
        }
        Ok(diagnostics.iter().map(|d| d.to_string()).collect())
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern: PARLEY_SECTION_KEY
    fn apply_env_overrides(&mut self) {
        // Agent
        if let Some(v) = env_parse("PARLEY_AGENT_MAX_TOOL_CALL_COUNT") {
            self.agent.max_tool_call_count = v;
        }
        if let Some(v) = env_parse("PARLEY_AGENT_MAX_ACTIVE_GROUPS") {
            self.agent.max_active_groups = v;
        }
        if let Some(v) = env_parse("PARLEY_AGENT_REQUEST_TIMEOUT_SECS") {
            self.agent.request_timeout_secs = v;
        }
        if let Ok(val) = std::env::var("PARLEY_AGENT_DEFAULT_MODEL") {
            self.agent.default_model = Some(val);
        }

        // Compaction
        if let Some(v) = env_parse("PARLEY_COMPACTION_SUMMARIZE_THRESHOLD") {
            self.compaction.summarize_threshold = v;
        }
        if let Some(v) = env_parse("PARLEY_COMPACTION_ANCHOR_THRESHOLD") {
            self.compaction.anchor_threshold = v;
        }
        if let Some(v) = env_parse("PARLEY_COMPACTION_MAX_TOKEN_THRESHOLD") {
            self.compaction.max_token_threshold = v;
        }

        // Normalizer
        if let Some(v) = env_parse("PARLEY_NORMALIZER_ENABLE_IMAGE_UNDERSTANDING") {
            self.normalizer.enable_image_understanding = v;
        }
        if let Some(v) = env_parse("PARLEY_NORMALIZER_FORWARD_COUNT") {
            self.normalizer.forward_count = v;
        }

        // Storage
        if let Ok(val) = std::env::var("PARLEY_STORAGE_PATH") {
            self.storage.path = Some(val);
        }

        // Logging
        if let Ok(val) = std::env::var("PARLEY_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(v) = env_parse("PARLEY_LOG_FORMAT") {
            self.logging.format = v;
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|val| val.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Capability;
    use std::env;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.agent.max_tool_call_count, 5);
        assert_eq!(config.agent.max_active_groups, 50);
        assert_eq!(config.compaction.summarize_threshold, 60);
        assert_eq!(config.compaction.anchor_threshold, 20);
        assert_eq!(config.compaction.max_token_threshold, 0.80);
        assert!(config.normalizer.enable_image_understanding);
        assert_eq!(config.normalizer.forward_count, 30);
        assert!(config.models.is_empty());
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "agent": {"max_tool_call_count": 3},
            "models": [{
                "name": "deepseek",
                "base_url": "https://api.deepseek.com",
                "model": "deepseek-chat",
                "capabilities": ["chat", "json-output", "function-calling"]
            }]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.agent.max_tool_call_count, 3);
        // Defaults apply to unspecified fields
        assert_eq!(config.agent.max_active_groups, 50);
        assert_eq!(config.models[0].context_window, 128_000);
        assert_eq!(
            config.models[0].capabilities,
            vec![
                Capability::Chat,
                Capability::JsonOutput,
                Capability::FunctionCalling
            ]
        );
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.compaction.summarize_threshold, 60);
    }

    #[test]
    fn test_load_invalid_json_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Config::load_from_path(&path).is_err());
    }

    #[test]
    fn test_env_override() {
        env::set_var("PARLEY_COMPACTION_ANCHOR_THRESHOLD", "12");
        env::set_var("PARLEY_NORMALIZER_ENABLE_IMAGE_UNDERSTANDING", "false");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.compaction.anchor_threshold, 12);
        assert!(!config.normalizer.enable_image_understanding);

        env::remove_var("PARLEY_COMPACTION_ANCHOR_THRESHOLD");
        env::remove_var("PARLEY_NORMALIZER_ENABLE_IMAGE_UNDERSTANDING");
    }

    #[test]
    fn test_env_override_ignores_unparseable() {
        env::set_var("PARLEY_AGENT_MAX_ACTIVE_GROUPS", "lots");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.agent.max_active_groups, 50);

        env::remove_var("PARLEY_AGENT_MAX_ACTIVE_GROUPS");
    }

    #[test]
    fn test_validate_rejects_zero_tool_rounds() {
        let mut config = Config::default();
        config.agent.max_tool_call_count = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("agent.max_tool_call_count"));
    }

    #[test]
    fn test_storage_dir_override() {
        let mut config = Config::default();
        config.storage.path = Some("/tmp/parley-test".into());
        assert_eq!(config.storage_dir(), PathBuf::from("/tmp/parley-test"));
    }
}
