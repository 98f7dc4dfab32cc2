//! LuaBot configuration
//!
//! Settings come from, in increasing precedence: built-in defaults, an
//! optional JSON file, the `HALSIM_EXTENSIONS` environment variable (for the
//! simulation extension list), and command-line flags applied by the binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bridge::BridgeConfig;
use crate::engine::{DEFAULT_HOOK_INTERVAL, EngineOptions};

/// Environment variable listing simulation extensions, colon separated.
pub const SIM_EXTENSIONS_ENV: &str = "HALSIM_EXTENSIONS";

/// Extensions loaded when nothing else is configured.
pub const DEFAULT_SIM_EXTENSIONS: &[&str] = &["halsim_ds_socket", "halsim_gui"];

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Config file is not valid JSON for this schema
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Simulation host settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Simulation extensions to load
    pub extensions: Vec<String>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_SIM_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LuabotConfig {
    /// Milliseconds to wait for the robot thread after the host loop exits
    pub join_timeout_ms: u64,

    /// VM instructions between checks for queued robot calls (0 disables)
    pub hook_interval: u32,

    /// Simulation host settings
    pub sim: SimConfig,
}

impl Default for LuabotConfig {
    fn default() -> Self {
        Self {
            join_timeout_ms: 1_000,
            hook_interval: DEFAULT_HOOK_INTERVAL,
            sim: SimConfig::default(),
        }
    }
}

impl LuabotConfig {
    /// Load a JSON config file; missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(mut self) -> Self {
        let value = std::env::var(SIM_EXTENSIONS_ENV).ok();
        self.apply_extensions_override(value.as_deref());
        self
    }

    /// Replace the extension list with a colon-separated override, unless it
    /// is unset or empty.
    pub fn apply_extensions_override(&mut self, value: Option<&str>) {
        let Some(value) = value.filter(|value| !value.is_empty()) else {
            return;
        };
        self.sim.extensions = value
            .split(':')
            .filter(|ext| !ext.is_empty())
            .map(str::to_string)
            .collect();
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.join_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "join_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Bridge settings derived from this config
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            join_timeout: Duration::from_millis(self.join_timeout_ms),
            engine: EngineOptions {
                hook_interval: self.hook_interval,
            },
        }
    }
}
