use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while analyzing a lab or a single backtest
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Transport failure for lab {lab_id} backtest {backtest_id}: {reason}")]
    Transport {
        lab_id: String,
        backtest_id: String,
        reason: String,
    },

    #[error("Listing backtests failed for lab {lab_id}: {reason}")]
    Listing { lab_id: String, reason: String },

    #[error("Unparseable runtime record for backtest {backtest_id}: {reason}")]
    Structural { backtest_id: String, reason: String },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl AnalysisError {
    /// Transport failures can be retried by the caller; structural ones cannot.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::Transport { .. } | AnalysisError::Listing { .. })
    }
}

/// Errors related to the on-disk backtest cache
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("No cache entry for lab {lab_id} backtest {backtest_id}")]
    NotFound { lab_id: String, backtest_id: String },

    #[error("Malformed cache entry at {path:?}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Cache I/O failed at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize cache record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CacheError {
    /// A malformed entry is a cache miss, not a hard failure.
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::NotFound { .. } | CacheError::Malformed { .. })
    }
}

/// A runtime payload that cannot be read as a record at all
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record is null")]
    Null,

    #[error("record is a JSON {0}, expected an object")]
    NotAnObject(&'static str),

    #[error("record is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Non-fatal gaps found while extracting metrics from a parseable record.
///
/// Each variant names the default that was substituted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionAmbiguity {
    #[error("no performance report section; metrics defaulted")]
    MissingPerformanceReport,

    #[error("starting balance absent; configured default used")]
    MissingStartingBalance,

    #[error("realized profit history absent; treated as empty")]
    MissingProfitHistory,

    #[error("reported ROI absent; treated as 0")]
    MissingReportedRoi,

    #[error("reported max drawdown absent; derived from history")]
    MissingReportedDrawdown,

    #[error("closed position ledger absent; no trades counted")]
    MissingPositionLedger,

    #[error("position {position_id} has no entry orders; margin treated as 0")]
    MissingEntryOrders { position_id: String },

    #[error("parameter inputs absent; no parameter values copied")]
    MissingParameters,

    #[error("position ledger exceeds decimal range; ROI summed in f64")]
    InexactRoiArithmetic,
}
