//! Lab-level orchestration: list, fetch or reuse, extract, cache, rank.
//!
//! A pass drains the whole backtest listing, then works through it on a
//! bounded worker pool. Cached entries are reused, so an interrupted pass
//! resumes without redoing finished work. A failure on one backtest is
//! recorded and skipped.

use crate::application::timing::StageTimer;
use crate::config::Config;
use crate::domain::backtest::analysis::{BacktestAnalysis, BacktestFailure, LabAnalysisResult};
use crate::domain::backtest::extractor::MetricExtractor;
use crate::domain::errors::{AnalysisError, CacheError};
use crate::domain::performance::robustness::{RobustnessConfig, RobustnessMetrics, RobustnessScorer};
use crate::domain::ports::{BacktestListing, LabDataSource, PageRequest};
use crate::infrastructure::cache::{BacktestCache, CachedBacktest, GenerationIndex, ReportStore};
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything a lab pass needs, wired once by the caller.
#[derive(Clone)]
pub struct AnalysisContext {
    pub source: Arc<dyn LabDataSource>,
    pub cache: BacktestCache,
    pub reports: Option<ReportStore>,
    pub extractor: MetricExtractor,
    pub scorer: RobustnessConfig,
    pub workers: usize,
    pub page_size: usize,
}

impl AnalysisContext {
    pub fn new(source: Arc<dyn LabDataSource>, cache: BacktestCache) -> Self {
        Self {
            source,
            cache,
            reports: None,
            extractor: MetricExtractor::default(),
            scorer: RobustnessConfig::default(),
            workers: 4,
            page_size: 100,
        }
    }

    /// Opens the cache (and the report store when exports are enabled) under
    /// the configured base directory.
    pub fn from_config(source: Arc<dyn LabDataSource>, config: &Config) -> Result<Self> {
        let cache = BacktestCache::open(&config.cache.cache_dir)
            .context("Failed to open backtest cache")?;
        let reports = if config.cache.export_reports {
            Some(ReportStore::open(&config.cache.cache_dir).context("Failed to open report store")?)
        } else {
            None
        };

        Ok(Self {
            source,
            cache,
            reports,
            extractor: config.extractor(),
            scorer: config.robustness.clone(),
            workers: config.analysis.workers,
            page_size: config.analysis.page_size,
        })
    }

    pub fn with_reports(mut self, reports: ReportStore) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn with_extractor(mut self, extractor: MetricExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeOptions {
    /// Ignore cached entries and overwrite them with fresh data.
    pub refresh: bool,
}

struct Analyzed {
    analysis: BacktestAnalysis,
    cache_hit: bool,
}

pub struct LabAnalyzer {
    ctx: AnalysisContext,
}

impl LabAnalyzer {
    pub fn new(ctx: AnalysisContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &AnalysisContext {
        &self.ctx
    }

    pub async fn analyze_lab(&self, lab_id: &str, top_count: usize) -> Result<LabAnalysisResult> {
        self.analyze_lab_with(lab_id, top_count, AnalyzeOptions::default())
            .await
    }

    pub async fn analyze_lab_with(
        &self,
        lab_id: &str,
        top_count: usize,
        options: AnalyzeOptions,
    ) -> Result<LabAnalysisResult> {
        let _timer = StageTimer::new(&format!("Analyze lab {}", lab_id));
        let started = Instant::now();

        let lab_name = self.resolve_lab_name(lab_id).await;
        let listings = self.list_all_backtests(lab_id).await?;
        let total_backtests = listings.len();
        info!(
            "Lab {} ({}): {} backtests, {} workers, refresh={}",
            lab_id, lab_name, total_backtests, self.ctx.workers, options.refresh
        );

        let index = self
            .ctx
            .reports
            .as_ref()
            .map(|r| r.load_index(lab_id))
            .unwrap_or_default();

        let outcomes: Vec<(String, Result<Analyzed, AnalysisError>)> = stream::iter(listings)
            .map(|listing| async move {
                let outcome = self.process_backtest(lab_id, &listing, options).await;
                (listing.backtest_id, outcome)
            })
            .buffer_unordered(self.ctx.workers.max(1))
            .collect()
            .await;

        let threshold = self.ctx.extractor.roi_divergence_threshold();
        let mut analyses = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        let mut cache_hits = 0;

        for (backtest_id, outcome) in outcomes {
            match outcome {
                Ok(done) => {
                    if done.cache_hit {
                        cache_hits += 1;
                    }
                    analyses.push(fill_from_index(done.analysis, &index));
                }
                Err(e) => {
                    warn!("Skipping backtest {} of lab {}: {}", backtest_id, lab_id, e);
                    failures.push(BacktestFailure {
                        backtest_id,
                        reason: e.to_string(),
                        retryable: e.is_retryable(),
                    });
                }
            }
        }
        failures.sort_by(|a, b| a.backtest_id.cmp(&b.backtest_id));

        let mut roi_divergent: Vec<String> = analyses
            .iter()
            .filter(|a| a.has_roi_divergence(threshold))
            .map(|a| a.backtest_id.clone())
            .collect();
        roi_divergent.sort();

        if let Some(reports) = &self.ctx.reports {
            if let Err(e) = reports.write_lab_report(lab_id, &analyses) {
                warn!("Failed to export report for lab {}: {}", lab_id, e);
            }
        }

        let analyzed_backtests = analyses.len();
        let top_backtests = rank_backtests(analyses, top_count);

        info!(
            "Lab {}: analyzed {}/{} ({} from cache, {} failed), {} ranked",
            lab_id,
            analyzed_backtests,
            total_backtests,
            cache_hits,
            failures.len(),
            top_backtests.len()
        );

        Ok(LabAnalysisResult {
            lab_id: lab_id.to_string(),
            lab_name,
            total_backtests,
            analyzed_backtests,
            cache_hits,
            top_backtests,
            failures,
            roi_divergent,
            processing_time: started.elapsed(),
        })
    }

    /// All readable cached analyses for a lab, ordered by backtest id.
    pub fn load_cached_analyses(&self, lab_id: &str) -> Result<Vec<BacktestAnalysis>> {
        load_cached(&self.ctx.cache, lab_id)
    }

    /// Re-derives every cached analysis of a lab from its stored raw record.
    /// Nothing is fetched.
    pub fn reanalyze_cached(&self, lab_id: &str) -> Result<Vec<BacktestAnalysis>> {
        let _timer = StageTimer::new(&format!("Re-analyze cached lab {}", lab_id));
        let keys = self
            .ctx
            .cache
            .list_keys(lab_id)
            .context(format!("Failed to list cache for lab {}", lab_id))?;

        let mut refreshed = Vec::with_capacity(keys.len());
        for backtest_id in keys {
            let cached = match self.ctx.cache.read(lab_id, &backtest_id) {
                Ok(cached) => cached,
                Err(e) => {
                    warn!("Skipping unreadable cache entry {}/{}: {}", lab_id, backtest_id, e);
                    continue;
                }
            };

            let previous = &cached.analysis;
            let analysis = match self.ctx.extractor.extract(lab_id, &backtest_id, &cached.raw_record) {
                Ok(a) => a.with_generation_fallback(previous.generation_idx, previous.population_idx),
                Err(e) => {
                    warn!("Cached record {}/{} no longer extracts: {}", lab_id, backtest_id, e);
                    continue;
                }
            };

            let record = CachedBacktest::new(cached.raw_record, analysis.clone());
            self.ctx
                .cache
                .write(lab_id, &backtest_id, &record)
                .context(format!("Failed to rewrite cache entry {}/{}", lab_id, backtest_id))?;
            refreshed.push(analysis);
        }

        info!("Re-analyzed {} cached backtests for lab {}", refreshed.len(), lab_id);
        Ok(refreshed)
    }

    /// Robustness metrics over the lab's cached analyses.
    pub fn score_lab(&self, lab_id: &str) -> Result<BTreeMap<String, RobustnessMetrics>> {
        let analyses = self.load_cached_analyses(lab_id)?;
        Ok(RobustnessScorer::new(self.ctx.scorer.clone()).score(&analyses))
    }

    async fn resolve_lab_name(&self, lab_id: &str) -> String {
        match self.ctx.source.list_labs().await {
            Ok(labs) => labs
                .into_iter()
                .find(|l| l.lab_id == lab_id)
                .map(|l| l.name)
                .unwrap_or_else(|| {
                    debug!("Lab {} not in lab listing, using id as name", lab_id);
                    lab_id.to_string()
                }),
            Err(e) => {
                warn!("Could not list labs, using id as name for {}: {:#}", lab_id, e);
                lab_id.to_string()
            }
        }
    }

    /// Drains every page. A repeated cursor ends the walk; repeated ids are dropped.
    async fn list_all_backtests(&self, lab_id: &str) -> Result<Vec<BacktestListing>> {
        let mut listings = Vec::new();
        let mut seen_ids = HashSet::new();
        let mut seen_cursors = HashSet::new();
        let mut cursor = 0_i64;
        seen_cursors.insert(cursor);

        loop {
            let page = self
                .ctx
                .source
                .list_backtests(
                    lab_id,
                    PageRequest {
                        next_page_id: cursor,
                        page_size: self.ctx.page_size,
                    },
                )
                .await
                .map_err(|e| AnalysisError::Listing {
                    lab_id: lab_id.to_string(),
                    reason: format!("{:#}", e),
                })?;

            for item in page.items {
                if seen_ids.insert(item.backtest_id.clone()) {
                    listings.push(item);
                } else {
                    debug!("Duplicate listing for backtest {} in lab {}", item.backtest_id, lab_id);
                }
            }

            match page.next_page_id {
                Some(next) if seen_cursors.insert(next) => cursor = next,
                Some(next) => {
                    warn!(
                        "Backtest listing for lab {} repeated page cursor {}, stopping",
                        lab_id, next
                    );
                    break;
                }
                None => break,
            }
        }

        Ok(listings)
    }

    async fn process_backtest(
        &self,
        lab_id: &str,
        listing: &BacktestListing,
        options: AnalyzeOptions,
    ) -> Result<Analyzed, AnalysisError> {
        let backtest_id = listing.backtest_id.as_str();

        if !options.refresh {
            match self.ctx.cache.read(lab_id, backtest_id) {
                Ok(cached) => {
                    debug!("Cache hit for {}/{}", lab_id, backtest_id);
                    return Ok(Analyzed {
                        analysis: cached.analysis,
                        cache_hit: true,
                    });
                }
                Err(e) if e.is_miss() => {
                    if !matches!(e, CacheError::NotFound { .. }) {
                        warn!("Discarding cache entry {}/{}: {}", lab_id, backtest_id, e);
                    }
                }
                Err(e) => warn!("Cache read failed for {}/{}, refetching: {}", lab_id, backtest_id, e),
            }
        }

        let raw = self
            .ctx
            .source
            .fetch_runtime(lab_id, backtest_id)
            .await
            .map_err(|e| AnalysisError::Transport {
                lab_id: lab_id.to_string(),
                backtest_id: backtest_id.to_string(),
                reason: format!("{:#}", e),
            })?;

        let analysis = self
            .ctx
            .extractor
            .extract(lab_id, backtest_id, &raw)?
            .with_generation_fallback(listing.generation_idx, listing.population_idx);

        let record = CachedBacktest::new(raw, analysis);
        if let Err(e) = self.ctx.cache.write(lab_id, backtest_id, &record) {
            warn!("Failed to cache backtest {}/{}: {}", lab_id, backtest_id, e);
        }

        Ok(Analyzed {
            analysis: record.analysis,
            cache_hit: false,
        })
    }
}

/// Readable cached analyses for a lab, ordered by backtest id. Unreadable
/// entries are skipped with a warning.
pub fn load_cached(cache: &BacktestCache, lab_id: &str) -> Result<Vec<BacktestAnalysis>> {
    let keys = cache
        .list_keys(lab_id)
        .context(format!("Failed to list cache for lab {}", lab_id))?;

    let mut analyses = Vec::with_capacity(keys.len());
    for backtest_id in keys {
        match cache.read(lab_id, &backtest_id) {
            Ok(cached) => analyses.push(cached.analysis),
            Err(e) => warn!("Skipping unreadable cache entry {}/{}: {}", lab_id, backtest_id, e),
        }
    }
    Ok(analyses)
}

/// Ranks a lab straight from the cache, without a data source.
pub fn summarize_cached(
    cache: &BacktestCache,
    lab_id: &str,
    top_count: usize,
    roi_divergence_threshold: f64,
) -> Result<LabAnalysisResult> {
    let started = Instant::now();
    let analyses = load_cached(cache, lab_id)?;

    let roi_divergent = analyses
        .iter()
        .filter(|a| a.has_roi_divergence(roi_divergence_threshold))
        .map(|a| a.backtest_id.clone())
        .collect();
    let count = analyses.len();

    Ok(LabAnalysisResult {
        lab_id: lab_id.to_string(),
        lab_name: lab_id.to_string(),
        total_backtests: count,
        analyzed_backtests: count,
        cache_hits: count,
        top_backtests: rank_backtests(analyses, top_count),
        failures: Vec::new(),
        roi_divergent,
        processing_time: started.elapsed(),
    })
}

/// Keeps profitable backtests and orders them best first.
///
/// Order: ROI desc, win rate desc, max drawdown asc, then backtest id asc.
pub fn rank_backtests(analyses: Vec<BacktestAnalysis>, top_count: usize) -> Vec<BacktestAnalysis> {
    let mut ranked: Vec<BacktestAnalysis> = analyses
        .into_iter()
        .filter(|a| a.roi_percentage > 0.0)
        .collect();
    ranked.sort_by(compare_ranking);
    ranked.truncate(top_count);
    ranked
}

fn compare_ranking(a: &BacktestAnalysis, b: &BacktestAnalysis) -> Ordering {
    b.roi_percentage
        .total_cmp(&a.roi_percentage)
        .then_with(|| b.win_rate.total_cmp(&a.win_rate))
        .then_with(|| a.max_drawdown.total_cmp(&b.max_drawdown))
        .then_with(|| a.backtest_id.cmp(&b.backtest_id))
}

fn fill_from_index(analysis: BacktestAnalysis, index: &GenerationIndex) -> BacktestAnalysis {
    if analysis.generation_idx.is_some() && analysis.population_idx.is_some() {
        return analysis;
    }
    match index.get(&analysis.backtest_id) {
        Some(&(generation, population)) => analysis.with_generation_fallback(generation, population),
        None => analysis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::extractor::MetricExtractor;
    use serde_json::json;

    fn analysis(id: &str, roi: f64, win_rate: f64, max_drawdown: f64) -> BacktestAnalysis {
        let raw = json!({
            "Reports": { "k": { "PR": { "SB": 1000, "RPH": [1.0], "ROI": roi, "MDD": max_drawdown } } }
        });
        let mut a = MetricExtractor::default().extract("lab", id, &raw).unwrap();
        a.win_rate = win_rate;
        a
    }

    fn ids(ranked: &[BacktestAnalysis]) -> Vec<&str> {
        ranked.iter().map(|a| a.backtest_id.as_str()).collect()
    }

    #[test]
    fn test_ranking_tie_breaks() {
        let ranked = rank_backtests(
            vec![
                analysis("a", 10.0, 0.5, 8.0),
                analysis("b", 10.0, 0.5, 3.0),
                analysis("c", 10.0, 0.6, 9.0),
                analysis("d", 12.0, 0.1, 20.0),
                analysis("e", 10.0, 0.5, 3.0),
            ],
            10,
        );
        assert_eq!(ids(&ranked), vec!["d", "c", "b", "e", "a"]);
    }

    #[test]
    fn test_ranking_drops_non_positive_and_truncates() {
        let ranked = rank_backtests(
            vec![
                analysis("flat", 0.0, 0.9, 0.0),
                analysis("loss", -4.0, 0.9, 0.0),
                analysis("x", 1.0, 0.5, 1.0),
                analysis("y", 2.0, 0.5, 1.0),
            ],
            1,
        );
        assert_eq!(ids(&ranked), vec!["y"]);
    }

    #[test]
    fn test_fill_from_index_only_fills_gaps() {
        let mut index = GenerationIndex::new();
        index.insert("a".to_string(), (Some(3), Some(7)));

        let filled = fill_from_index(analysis("a", 1.0, 0.5, 1.0), &index);
        assert_eq!((filled.generation_idx, filled.population_idx), (Some(3), Some(7)));

        let own = analysis("a", 1.0, 0.5, 1.0).with_generation_fallback(Some(1), Some(2));
        let kept = fill_from_index(own, &index);
        assert_eq!((kept.generation_idx, kept.population_idx), (Some(1), Some(2)));
    }
}
