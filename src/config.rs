//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section is optional; missing values fall back to defaults.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Weight of a forecaster with no calibration history.
    pub neutral_weight: f64,
    /// Commit attempts when the store reports a write conflict.
    pub max_resolution_attempts: u32,
    /// Parallel storage reads during population fan-out.
    pub fanout_concurrency: usize,
    /// Reject submissions after the event deadline.
    pub enforce_deadline: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            neutral_weight: 0.5,
            max_resolution_attempts: 3,
            fanout_concurrency: 16,
            enforce_deadline: true,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.neutral_weight) {
            bail!("engine.neutral_weight must be within [0, 1], got {}", self.neutral_weight);
        }
        if self.max_resolution_attempts == 0 {
            bail!("engine.max_resolution_attempts must be at least 1");
        }
        if self.fanout_concurrency == 0 {
            bail!("engine.fanout_concurrency must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            filter: "forecast_engine=info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Load `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.engine.validate()?;
        Ok(config)
    }
}
