//! Cache layout configuration.

use std::env;
use std::path::PathBuf;

pub const DEFAULT_CACHE_DIR: &str = "./.labscope_cache";

#[derive(Debug, Clone)]
pub struct CacheEnvConfig {
    /// Base directory; entries go to `backtests/`, exports to `reports/`.
    pub cache_dir: PathBuf,
    pub export_reports: bool,
}

impl Default for CacheEnvConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            export_reports: true,
        }
    }
}

impl CacheEnvConfig {
    pub fn from_env() -> Self {
        Self {
            cache_dir: env::var("LABSCOPE_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_DIR)),
            export_reports: env::var("LABSCOPE_EXPORT_REPORTS")
                .unwrap_or_else(|_| "true".to_string())
                .parse::<bool>()
                .unwrap_or(true),
        }
    }
}
