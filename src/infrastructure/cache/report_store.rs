//! Tabular lab reports under `<base>/reports/`.
//!
//! One CSV per lab. Besides being a handy export, the report is the fast
//! path for generation/population lookups when a listing omits them.

use crate::domain::backtest::analysis::BacktestAnalysis;
use crate::domain::errors::CacheError;
use crate::infrastructure::cache::backtest_cache::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const REPORTS_DIR: &str = "reports";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabReportRow {
    pub backtest_id: String,
    pub generation_idx: Option<u32>,
    pub population_idx: Option<u32>,
    pub script_name: String,
    pub market_tag: String,
    pub roi_percentage: f64,
    pub calculated_roi_percentage: f64,
    pub roi_difference: f64,
    pub win_rate: f64,
    pub total_trades: usize,
    pub max_drawdown: f64,
    pub final_balance: f64,
}

impl From<&BacktestAnalysis> for LabReportRow {
    fn from(a: &BacktestAnalysis) -> Self {
        Self {
            backtest_id: a.backtest_id.clone(),
            generation_idx: a.generation_idx,
            population_idx: a.population_idx,
            script_name: a.script_name.clone(),
            market_tag: a.market_tag.clone(),
            roi_percentage: a.roi_percentage,
            calculated_roi_percentage: a.calculated_roi_percentage,
            roi_difference: a.roi_difference,
            win_rate: a.win_rate,
            total_trades: a.total_trades,
            max_drawdown: a.max_drawdown,
            final_balance: a.final_balance,
        }
    }
}

/// (generation, population) per backtest id.
pub type GenerationIndex = HashMap<String, (Option<u32>, Option<u32>)>;

#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let dir = base_dir.as_ref().join(REPORTS_DIR);
        fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn report_path(&self, lab_id: &str) -> PathBuf {
        let safe: String = lab_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
            .collect();
        self.dir.join(format!("{}.csv", safe))
    }

    /// Rewrites the lab report from scratch, rows sorted by backtest id.
    pub fn write_lab_report(
        &self,
        lab_id: &str,
        analyses: &[BacktestAnalysis],
    ) -> Result<PathBuf, CacheError> {
        let path = self.report_path(lab_id);

        let mut rows: Vec<LabReportRow> = analyses.iter().map(LabReportRow::from).collect();
        rows.sort_by(|a, b| a.backtest_id.cmp(&b.backtest_id));

        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in &rows {
            writer.serialize(row).map_err(|e| csv_error(&path, e))?;
        }
        let bytes = writer.into_inner().map_err(|e| CacheError::Malformed {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        write_atomic(&path, &bytes)?;
        info!("Wrote lab report with {} rows to {:?}", rows.len(), path);
        Ok(path)
    }

    pub fn read_lab_report(&self, lab_id: &str) -> Result<Option<Vec<LabReportRow>>, CacheError> {
        let path = self.report_path(lab_id);
        if !path.exists() {
            return Ok(None);
        }

        let mut reader = csv::Reader::from_path(&path).map_err(|e| csv_error(&path, e))?;
        let rows = reader
            .deserialize::<LabReportRow>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| csv_error(&path, e))?;
        Ok(Some(rows))
    }

    /// Generation/population lookup for a lab. Empty when there is no usable report.
    pub fn load_index(&self, lab_id: &str) -> GenerationIndex {
        match self.read_lab_report(lab_id) {
            Ok(Some(rows)) => rows
                .into_iter()
                .map(|r| (r.backtest_id, (r.generation_idx, r.population_idx)))
                .collect(),
            Ok(None) => GenerationIndex::new(),
            Err(e) => {
                warn!("Ignoring unreadable lab report for {}: {}", lab_id, e);
                GenerationIndex::new()
            }
        }
    }
}

fn csv_error(path: &Path, error: csv::Error) -> CacheError {
    CacheError::Malformed {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}
