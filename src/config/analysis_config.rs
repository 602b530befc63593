//! Lab pass configuration: extraction defaults, worker pool and paging.

use crate::domain::backtest::extractor::{DEFAULT_STARTING_BALANCE, MetricExtractor};
use crate::domain::performance::drawdown::DrawdownAnalyzer;
use anyhow::{Context, Result, bail};
use std::env;

/// Upper bound for the synthesized drawdown sample spacing (one year).
pub const MAX_DRAWDOWN_SAMPLE_SECS: i64 = 365 * 24 * 3600;

#[derive(Debug, Clone)]
pub struct AnalysisEnvConfig {
    /// Used when a record has no starting balance.
    pub default_starting_balance: f64,
    pub workers: usize,
    /// ROI cross-check divergence, in percentage points.
    pub roi_divergence_pct: f64,
    pub drawdown_sample_secs: i64,
    pub page_size: usize,
}

impl Default for AnalysisEnvConfig {
    fn default() -> Self {
        Self {
            default_starting_balance: DEFAULT_STARTING_BALANCE,
            workers: 4,
            roi_divergence_pct: 5.0,
            drawdown_sample_secs: 3600,
            page_size: 100,
        }
    }
}

impl AnalysisEnvConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            default_starting_balance: Self::parse_f64(
                "LABSCOPE_DEFAULT_STARTING_BALANCE",
                DEFAULT_STARTING_BALANCE,
            )?,
            workers: Self::parse_usize("LABSCOPE_WORKERS", 4)?,
            roi_divergence_pct: Self::parse_f64("LABSCOPE_ROI_DIVERGENCE_PCT", 5.0)?,
            drawdown_sample_secs: env::var("LABSCOPE_DRAWDOWN_SAMPLE_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse::<i64>()
                .context("Failed to parse LABSCOPE_DRAWDOWN_SAMPLE_SECS")?,
            page_size: Self::parse_usize("LABSCOPE_PAGE_SIZE", 100)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("LABSCOPE_WORKERS must be at least 1");
        }
        if self.page_size == 0 {
            bail!("LABSCOPE_PAGE_SIZE must be at least 1");
        }
        if !(1..=MAX_DRAWDOWN_SAMPLE_SECS).contains(&self.drawdown_sample_secs) {
            bail!(
                "LABSCOPE_DRAWDOWN_SAMPLE_SECS must be between 1 and {}",
                MAX_DRAWDOWN_SAMPLE_SECS
            );
        }
        if !(self.default_starting_balance.is_finite() && self.default_starting_balance > 0.0) {
            bail!("LABSCOPE_DEFAULT_STARTING_BALANCE must be a positive number");
        }
        Ok(())
    }

    pub fn extractor(&self) -> MetricExtractor {
        MetricExtractor::new(
            self.default_starting_balance,
            self.roi_divergence_pct,
            DrawdownAnalyzer::new(chrono::Duration::seconds(
                self.drawdown_sample_secs.clamp(1, MAX_DRAWDOWN_SAMPLE_SECS),
            )),
        )
    }

    fn parse_usize(key: &str, default: usize) -> Result<usize> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<usize>()
            .context(format!("Failed to parse {}", key))
    }

    fn parse_f64(key: &str, default: f64) -> Result<f64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<f64>()
            .context(format!("Failed to parse {}", key))
    }
}
