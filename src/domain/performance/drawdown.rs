use crate::domain::backtest::analysis::{DrawdownAnalysis, DrawdownEvent};
use chrono::{DateTime, Duration, Utc};

/// Detects drawdown samples in a realized-profit history.
///
/// The baseline is zero: every negative sample is a drawdown sample. Results
/// depend only on the values and order of the history, plus the anchor used
/// to synthesize event timestamps.
#[derive(Debug, Clone)]
pub struct DrawdownAnalyzer {
    sample_interval: Duration,
}

impl DrawdownAnalyzer {
    pub fn new(sample_interval: Duration) -> Self {
        Self { sample_interval }
    }

    /// Analyze with timestamps laid out from the unix epoch.
    pub fn analyze(&self, history: &[f64]) -> DrawdownAnalysis {
        let anchor = i32::try_from(history.len().saturating_sub(1))
            .ok()
            .and_then(|n| self.sample_interval.checked_mul(n))
            .and_then(|span| DateTime::<Utc>::UNIX_EPOCH.checked_add_signed(span))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        self.analyze_anchored(history, anchor)
    }

    /// Analyze with the last sample pinned at `anchor` and earlier samples
    /// spaced evenly backward by the sample interval.
    pub fn analyze_anchored(&self, history: &[f64], anchor: DateTime<Utc>) -> DrawdownAnalysis {
        if history.is_empty() {
            return DrawdownAnalysis::empty();
        }

        let lowest_balance = history.iter().copied().fold(f64::INFINITY, f64::min);
        let max_drawdown_percentage = if lowest_balance < 0.0 {
            lowest_balance.abs()
        } else {
            0.0
        };

        let last_idx = history.len() - 1;
        let events: Vec<DrawdownEvent> = history
            .iter()
            .enumerate()
            .filter(|(_, sample)| **sample < 0.0)
            .map(|(idx, sample)| DrawdownEvent {
                timestamp: self.sample_time(anchor, last_idx - idx),
                sample_index: idx,
                balance: *sample,
                drawdown_amount: sample.abs(),
                drawdown_percentage: sample.abs(),
            })
            .collect();

        DrawdownAnalysis {
            max_drawdown_percentage,
            lowest_balance,
            drawdown_count: events.len(),
            events,
            balance_history: history.to_vec(),
        }
    }

    /// `steps_back` intervals before `anchor`, floored at the unix epoch
    /// when the offset leaves the representable range.
    fn sample_time(&self, anchor: DateTime<Utc>, steps_back: usize) -> DateTime<Utc> {
        i32::try_from(steps_back)
            .ok()
            .and_then(|n| self.sample_interval.checked_mul(n))
            .and_then(|offset| anchor.checked_sub_signed(offset))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Default for DrawdownAnalyzer {
    fn default() -> Self {
        Self::new(Duration::hours(1))
    }
}
