//! Range generation settings: an optional TOML file plus env overrides.

use crate::domain::optimization::range_generator::RangeConfig;
use anyhow::{Context, Result, bail};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct RangeEnvConfig {
    pub config_path: Option<PathBuf>,
    pub max_values: Option<usize>,
}

impl RangeEnvConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            config_path: env::var("LABSCOPE_RANGE_CONFIG").ok().map(PathBuf::from),
            max_values: env::var("LABSCOPE_RANGE_MAX_VALUES")
                .ok()
                .map(|s| s.parse::<usize>())
                .transpose()
                .context("Failed to parse LABSCOPE_RANGE_MAX_VALUES")?,
        })
    }

    pub fn resolve(&self) -> Result<RangeConfig> {
        let mut config = match &self.config_path {
            Some(path) => load_range_config(path)?,
            None => RangeConfig::default(),
        };
        if let Some(max_values) = self.max_values {
            config.max_values = max_values;
        }
        if config.max_values < 2 {
            bail!("Range max_values must be at least 2, got {}", config.max_values);
        }
        Ok(config)
    }
}

/// Reads a `RangeConfig` from TOML. Missing keys keep their defaults.
pub fn load_range_config(path: &Path) -> Result<RangeConfig> {
    let content = fs::read_to_string(path)
        .context(format!("Failed to read range config: {}", path.display()))?;
    let config: RangeConfig = toml::from_str(&content)
        .context(format!("Failed to parse range config TOML: {}", path.display()))?;
    Ok(config)
}
