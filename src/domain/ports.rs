use crate::domain::optimization::parameter::RawLabParameter;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabSummary {
    pub lab_id: String,
    pub name: String,
}

/// One entry of a lab's backtest listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestListing {
    pub backtest_id: String,
    #[serde(default)]
    pub generation_idx: Option<u32>,
    #[serde(default)]
    pub population_idx: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    pub next_page_id: i64,
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestPage {
    pub items: Vec<BacktestListing>,
    /// `None` on the last page.
    pub next_page_id: Option<i64>,
}

/// Remote backtesting service as seen by the analytics core.
///
/// Implementations own transport concerns: timeouts, rate limits, retries
/// and authentication.
#[async_trait]
pub trait LabDataSource: Send + Sync {
    async fn list_labs(&self) -> Result<Vec<LabSummary>>;

    async fn list_backtests(&self, lab_id: &str, page: PageRequest) -> Result<BacktestPage>;

    async fn fetch_runtime(&self, lab_id: &str, backtest_id: &str) -> Result<Value>;

    async fn fetch_lab_parameters(&self, lab_id: &str) -> Result<Vec<RawLabParameter>>;
}
