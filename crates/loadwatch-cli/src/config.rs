//! Host configuration file

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use loadwatch::config::DEFAULT_PROCESS_NAME;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Default polling interval, matching the timer host's refresh rate
pub const DEFAULT_INTERVAL_MS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Substring the target process name must contain
    pub process_name: String,
    /// Milliseconds between engine ticks
    pub interval_ms: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            process_name: DEFAULT_PROCESS_NAME.to_string(),
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

impl CliConfig {
    /// Parse a config file; `Ok(None)` when it does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(config))
    }

    /// Load a config file, falling back to defaults when it is missing or bad
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(Some(config)) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Ok(None) => {
                debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("{:#}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Apply command-line overrides on top of file values
    pub fn with_overrides(
        mut self,
        process_name: Option<String>,
        interval_ms: Option<u64>,
    ) -> Self {
        if let Some(name) = process_name {
            self.process_name = name;
        }
        if let Some(ms) = interval_ms {
            self.interval_ms = ms;
        }
        self
    }

    /// Tick interval, never zero
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}
