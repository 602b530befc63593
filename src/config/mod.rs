//! Configuration for labscope.
//!
//! Every setting comes from the environment with a default, grouped by
//! concern: cache layout, analysis pass, robustness scoring and range
//! generation.

mod analysis_config;
mod cache_config;
mod range_config;
mod robustness_config;

pub use analysis_config::AnalysisEnvConfig;
pub use cache_config::CacheEnvConfig;
pub use range_config::{RangeEnvConfig, load_range_config};
pub use robustness_config::RobustnessEnvConfig;

use crate::domain::backtest::extractor::MetricExtractor;
use crate::domain::optimization::range_generator::RangeConfig;
use crate::domain::performance::robustness::RobustnessConfig;
use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub cache: CacheEnvConfig,
    pub analysis: AnalysisEnvConfig,
    pub robustness: RobustnessConfig,
    pub ranges: RangeConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let cache = CacheEnvConfig::from_env();
        let analysis = AnalysisEnvConfig::from_env().context("Failed to load analysis config")?;
        let robustness = RobustnessEnvConfig::from_env()
            .context("Failed to load robustness config")?
            .into_scorer_config();
        let ranges = RangeEnvConfig::from_env()
            .context("Failed to load range config")?
            .resolve()?;

        Ok(Self {
            cache,
            analysis,
            robustness,
            ranges,
        })
    }

    pub fn extractor(&self) -> MetricExtractor {
        self.analysis.extractor()
    }
}
