use crate::domain::optimization::parameter::RawLabParameter;
use crate::domain::ports::{
    BacktestListing, BacktestPage, LabDataSource, LabSummary, PageRequest,
};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct LabFixture {
    name: String,
    backtests: Vec<BacktestListing>,
    runtimes: HashMap<String, Value>,
    parameters: Vec<RawLabParameter>,
}

/// In-process [`LabDataSource`] for tests.
///
/// Counts every runtime fetch so callers can assert on cache behavior.
#[derive(Debug, Default)]
pub struct InMemoryLabDataSource {
    labs: RwLock<HashMap<String, LabFixture>>,
    failing: RwLock<HashSet<String>>,
    stuck_cursor: bool,
    runtime_fetches: AtomicUsize,
    page_requests: AtomicUsize,
}

impl InMemoryLabDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every page reports the same cursor, as a misbehaving server would.
    pub fn with_stuck_cursor(mut self) -> Self {
        self.stuck_cursor = true;
        self
    }

    pub fn with_lab(mut self, lab_id: &str, name: &str) -> Self {
        self.fixture(lab_id).name = name.to_string();
        self
    }

    pub fn with_backtest(
        mut self,
        lab_id: &str,
        backtest_id: &str,
        generation_idx: Option<u32>,
        population_idx: Option<u32>,
        runtime: Value,
    ) -> Self {
        let lab = self.fixture(lab_id);
        lab.backtests.push(BacktestListing {
            backtest_id: backtest_id.to_string(),
            generation_idx,
            population_idx,
        });
        lab.runtimes.insert(backtest_id.to_string(), runtime);
        self
    }

    pub fn with_parameters(mut self, lab_id: &str, parameters: Vec<RawLabParameter>) -> Self {
        self.fixture(lab_id).parameters = parameters;
        self
    }

    fn fixture(&mut self, lab_id: &str) -> &mut LabFixture {
        self.labs
            .get_mut()
            .entry(lab_id.to_string())
            .or_insert_with(|| LabFixture {
                name: lab_id.to_string(),
                ..LabFixture::default()
            })
    }

    /// Runtime fetches for this backtest fail until [`Self::recover`] is called.
    pub async fn fail_backtest(&self, backtest_id: &str) {
        self.failing.write().await.insert(backtest_id.to_string());
    }

    pub async fn recover(&self, backtest_id: &str) {
        self.failing.write().await.remove(backtest_id);
    }

    pub async fn replace_runtime(&self, lab_id: &str, backtest_id: &str, runtime: Value) {
        let mut labs = self.labs.write().await;
        if let Some(lab) = labs.get_mut(lab_id) {
            lab.runtimes.insert(backtest_id.to_string(), runtime);
        }
    }

    pub fn runtime_fetches(&self) -> usize {
        self.runtime_fetches.load(Ordering::SeqCst)
    }

    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LabDataSource for InMemoryLabDataSource {
    async fn list_labs(&self) -> Result<Vec<LabSummary>> {
        let labs = self.labs.read().await;
        let mut summaries: Vec<LabSummary> = labs
            .iter()
            .map(|(lab_id, lab)| LabSummary {
                lab_id: lab_id.clone(),
                name: lab.name.clone(),
            })
            .collect();
        summaries.sort_by(|a, b| a.lab_id.cmp(&b.lab_id));
        Ok(summaries)
    }

    async fn list_backtests(&self, lab_id: &str, page: PageRequest) -> Result<BacktestPage> {
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        let labs = self.labs.read().await;
        let Some(lab) = labs.get(lab_id) else {
            return Ok(BacktestPage {
                items: Vec::new(),
                next_page_id: None,
            });
        };

        let page_size = page.page_size.max(1);
        let start = usize::try_from(page.next_page_id.max(0)).unwrap_or(0) * page_size;
        let items: Vec<BacktestListing> = lab
            .backtests
            .iter()
            .skip(start)
            .take(page_size)
            .cloned()
            .collect();

        let next_page_id = if self.stuck_cursor {
            Some(page.next_page_id)
        } else if start + page_size < lab.backtests.len() {
            Some(page.next_page_id + 1)
        } else {
            None
        };

        debug!(
            "Mock listing for {}: page {} -> {} items",
            lab_id,
            page.next_page_id,
            items.len()
        );
        Ok(BacktestPage {
            items,
            next_page_id,
        })
    }

    async fn fetch_runtime(&self, lab_id: &str, backtest_id: &str) -> Result<Value> {
        self.runtime_fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.read().await.contains(backtest_id) {
            return Err(anyhow!("simulated transport failure for {}", backtest_id));
        }

        let labs = self.labs.read().await;
        labs.get(lab_id)
            .and_then(|lab| lab.runtimes.get(backtest_id))
            .cloned()
            .ok_or_else(|| anyhow!("backtest {} not found in lab {}", backtest_id, lab_id))
    }

    async fn fetch_lab_parameters(&self, lab_id: &str) -> Result<Vec<RawLabParameter>> {
        let labs = self.labs.read().await;
        labs.get(lab_id)
            .map(|lab| lab.parameters.clone())
            .ok_or_else(|| anyhow!("lab {} not found", lab_id))
    }
}
