use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default substring a target process name must contain
pub const DEFAULT_PROCESS_NAME: &str = "mc2";

/// Configuration for the hook engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Case-insensitive substring matched against process names
    pub process_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            process_name: DEFAULT_PROCESS_NAME.to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a new configuration builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

/// Builder for EngineConfig
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    process_name: Option<String>,
}

impl EngineConfigBuilder {
    /// Set the process name substring
    pub fn process_name<S: Into<String>>(mut self, name: S) -> Self {
        self.process_name = Some(name.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> EngineConfig {
        let default = EngineConfig::default();
        EngineConfig {
            process_name: self.process_name.unwrap_or(default.process_name),
        }
    }
}

/// Persisted settings node
///
/// There is nothing to configure yet. The type exists so hosts can store and
/// reload a settings blob; unknown fields from newer hosts are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {}

impl Settings {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = EngineConfig::builder().build();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.process_name, "mc2");
    }

    #[test]
    fn test_builder_override() {
        let config = EngineConfig::builder().process_name("mc2_cracked").build();
        assert_eq!(config.process_name, "mc2_cracked");
    }

    #[test]
    fn test_settings_serialise_empty() {
        assert_eq!(Settings::default().to_json().unwrap(), "{}");
    }

    #[test]
    fn test_settings_ignore_unknown_fields() {
        let settings = Settings::from_json(r#"{"version": 3, "extra": [1, 2]}"#).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(Settings::from_json("[").is_err());
    }
}
