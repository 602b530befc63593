use crate::domain::optimization::parameter::RawLabParameter;
use crate::domain::ports::{BacktestPage, LabDataSource, LabSummary, PageRequest};
use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;

/// [`LabDataSource`] for runs that must never reach the backtesting service.
///
/// Lists nothing and refuses every fetch, so only cached data can be used.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineLabDataSource;

#[async_trait]
impl LabDataSource for OfflineLabDataSource {
    async fn list_labs(&self) -> Result<Vec<LabSummary>> {
        Ok(Vec::new())
    }

    async fn list_backtests(&self, lab_id: &str, _page: PageRequest) -> Result<BacktestPage> {
        bail!("offline: cannot list backtests for lab {}", lab_id)
    }

    async fn fetch_runtime(&self, lab_id: &str, backtest_id: &str) -> Result<Value> {
        bail!(
            "offline: cannot fetch backtest {} of lab {}",
            backtest_id,
            lab_id
        )
    }

    async fn fetch_lab_parameters(&self, lab_id: &str) -> Result<Vec<RawLabParameter>> {
        bail!("offline: cannot fetch parameters for lab {}", lab_id)
    }
}
