//! Robustness scoring weights and risk thresholds.

use crate::domain::performance::robustness::RobustnessConfig;
use anyhow::{Context, Result, bail};
use std::env;

#[derive(Debug, Clone)]
pub struct RobustnessEnvConfig {
    pub roi_weight: f64,
    pub drawdown_weight: f64,
    pub win_rate_weight: f64,
    pub min_trades: usize,
    pub low_risk_threshold: f64,
    pub medium_risk_threshold: f64,
}

impl RobustnessEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = RobustnessConfig::default();
        let config = Self {
            roi_weight: Self::parse_f64("LABSCOPE_ROI_WEIGHT", defaults.roi_weight)?,
            drawdown_weight: Self::parse_f64("LABSCOPE_DRAWDOWN_WEIGHT", defaults.drawdown_weight)?,
            win_rate_weight: Self::parse_f64("LABSCOPE_WIN_RATE_WEIGHT", defaults.win_rate_weight)?,
            min_trades: env::var("LABSCOPE_MIN_TRADES")
                .unwrap_or_else(|_| defaults.min_trades.to_string())
                .parse::<usize>()
                .context("Failed to parse LABSCOPE_MIN_TRADES")?,
            low_risk_threshold: Self::parse_f64(
                "LABSCOPE_LOW_RISK_THRESHOLD",
                defaults.low_risk_threshold,
            )?,
            medium_risk_threshold: Self::parse_f64(
                "LABSCOPE_MEDIUM_RISK_THRESHOLD",
                defaults.medium_risk_threshold,
            )?,
        };

        if config.roi_weight < 0.0 || config.drawdown_weight < 0.0 || config.win_rate_weight < 0.0
        {
            bail!("Robustness weights must not be negative");
        }
        if config.roi_weight + config.drawdown_weight + config.win_rate_weight <= 0.0 {
            bail!("At least one robustness weight must be positive");
        }
        if config.medium_risk_threshold > config.low_risk_threshold {
            bail!(
                "LABSCOPE_MEDIUM_RISK_THRESHOLD ({}) exceeds LABSCOPE_LOW_RISK_THRESHOLD ({})",
                config.medium_risk_threshold,
                config.low_risk_threshold
            );
        }
        Ok(config)
    }

    pub fn into_scorer_config(self) -> RobustnessConfig {
        RobustnessConfig {
            roi_weight: self.roi_weight,
            drawdown_weight: self.drawdown_weight,
            win_rate_weight: self.win_rate_weight,
            min_trades: self.min_trades,
            low_risk_threshold: self.low_risk_threshold,
            medium_risk_threshold: self.medium_risk_threshold,
            ..RobustnessConfig::default()
        }
    }

    fn parse_f64(key: &str, default: f64) -> Result<f64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<f64>()
            .context(format!("Failed to parse {}", key))
    }
}
