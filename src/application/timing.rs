use crate::domain::backtest::analysis::LabAnalysisResult;
use std::time::{Duration, Instant};
use tracing::info;

/// Logs how long a stage took when it goes out of scope.
///
/// ```
/// use labscope::application::timing::StageTimer;
///
/// {
///     let _timer = StageTimer::new("Analyze lab");
///     // ... work ...
/// } // elapsed time logged here
/// ```
pub struct StageTimer {
    start: Instant,
    label: String,
}

impl StageTimer {
    pub fn new(label: &str) -> Self {
        info!("Starting: {}", label);
        Self {
            start: Instant::now(),
            label: label.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        info!("Completed: {} in {:.2}s", self.label, self.elapsed_seconds());
    }
}

/// Throughput summary for one lab pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassStats {
    pub total_backtests: usize,
    pub analyzed: usize,
    pub failed: usize,
    pub cache_hits: usize,
    pub total_time_seconds: f64,
    pub avg_time_per_backtest_seconds: f64,
    pub cache_hit_ratio: f64,
}

impl PassStats {
    pub fn from_result(result: &LabAnalysisResult) -> Self {
        let total_time_seconds = result.processing_time.as_secs_f64();
        let avg_time_per_backtest_seconds = if result.total_backtests > 0 {
            total_time_seconds / result.total_backtests as f64
        } else {
            0.0
        };
        let cache_hit_ratio = if result.analyzed_backtests > 0 {
            result.cache_hits as f64 / result.analyzed_backtests as f64
        } else {
            0.0
        };

        Self {
            total_backtests: result.total_backtests,
            analyzed: result.analyzed_backtests,
            failed: result.failures.len(),
            cache_hits: result.cache_hits,
            total_time_seconds,
            avg_time_per_backtest_seconds,
            cache_hit_ratio,
        }
    }

    pub fn print_summary(&self) {
        println!("{}", "=".repeat(80));
        println!("PASS STATISTICS");
        println!("{}", "=".repeat(80));
        println!("Total Backtests:      {}", self.total_backtests);
        println!("Analyzed:             {}", self.analyzed);
        println!("Failed:               {}", self.failed);
        println!(
            "Cache Hits:           {} ({:.0}%)",
            self.cache_hits,
            self.cache_hit_ratio * 100.0
        );
        println!("Total Time:           {:.2}s", self.total_time_seconds);
        println!(
            "Avg Time/Backtest:    {:.3}s",
            self.avg_time_per_backtest_seconds
        );
        println!("{}", "=".repeat(80));
    }
}
