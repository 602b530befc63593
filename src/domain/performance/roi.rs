use crate::domain::backtest::raw_record::{RawPosition, RawRecord};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

/// ROI re-derived from the closed-position ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiCheck {
    pub calculated_roi_percentage: f64,
    pub total_net_profit: f64,
    pub total_trade_amount: f64,
    pub positions: usize,
    pub winning_positions: usize,
    /// Positions with no entry-order list; their margin counts as zero.
    pub positions_without_entries: Vec<String>,
    /// False when a value or a sum left the decimal range and the
    /// totals were accumulated in f64 instead.
    pub exact_arithmetic: bool,
}

impl RoiCheck {
    /// Absolute gap in percentage points to a platform-reported ROI.
    pub fn difference_from(&self, reported_roi: f64) -> f64 {
        (reported_roi - self.calculated_roi_percentage).abs()
    }

    pub fn diverges(&self, reported_roi: f64, threshold_pct: f64) -> bool {
        self.difference_from(reported_roi) > threshold_pct
    }
}

/// Recomputes ROI independently of the platform figure.
///
/// Per position: `net = realized_profit - fees` and
/// `trade_amount = sum(entry order margins)`. The result is
/// `100 * sum(net) / sum(trade_amount)`, or 0 when nothing was deployed.
pub struct RoiCrossChecker;

impl RoiCrossChecker {
    pub fn calculate_roi(record: &RawRecord) -> f64 {
        Self::check(record).calculated_roi_percentage
    }

    pub fn check(record: &RawRecord) -> RoiCheck {
        let positions = record.closed_positions().unwrap_or_default();
        Self::check_positions(&positions)
    }

    pub fn check_positions(positions: &[RawPosition]) -> RoiCheck {
        let mut winning_positions = 0;
        let mut positions_without_entries = Vec::new();
        let mut float_net = 0.0;
        let mut float_amount = 0.0;
        let mut exact = Some((Decimal::ZERO, Decimal::ZERO));

        for position in positions {
            let net = position.realized_profit - position.fees;
            let amount: f64 = match &position.entry_margins {
                Some(margins) => margins.iter().sum(),
                None => {
                    positions_without_entries.push(position.id.clone());
                    0.0
                }
            };
            float_net += net;
            float_amount += amount;

            let exact_net = exact.as_mut().and_then(|sums| accumulate(sums, position));
            if exact_net.is_none() {
                exact = None;
            }
            if exact_net.map_or(net > 0.0, |n| n > Decimal::ZERO) {
                winning_positions += 1;
            }
        }

        let exact_roi = exact.and_then(|(net, amount)| {
            if amount.is_zero() {
                return Some((0.0, net, amount));
            }
            let roi = net
                .checked_div(amount)?
                .checked_mul(Decimal::ONE_HUNDRED)?
                .to_f64()?;
            Some((roi, net, amount))
        });

        let (calculated_roi_percentage, total_net_profit, total_trade_amount, exact_arithmetic) =
            match exact_roi {
                Some((roi, net, amount)) => (
                    roi,
                    net.to_f64().unwrap_or(float_net),
                    amount.to_f64().unwrap_or(float_amount),
                    true,
                ),
                None => (
                    float_roi(float_net, float_amount),
                    float_net,
                    float_amount,
                    false,
                ),
            };

        RoiCheck {
            calculated_roi_percentage,
            total_net_profit,
            total_trade_amount,
            positions: positions.len(),
            winning_positions,
            positions_without_entries,
            exact_arithmetic,
        }
    }
}

/// Adds one position to the decimal sums and returns its net profit.
/// `None` when a value is outside the decimal range or a sum overflows.
fn accumulate(sums: &mut (Decimal, Decimal), position: &RawPosition) -> Option<Decimal> {
    let net = to_decimal(position.realized_profit)?.checked_sub(to_decimal(position.fees)?)?;
    let mut amount = Decimal::ZERO;
    for margin in position.entry_margins.iter().flatten() {
        amount = amount.checked_add(to_decimal(*margin)?)?;
    }
    sums.0 = sums.0.checked_add(net)?;
    sums.1 = sums.1.checked_add(amount)?;
    Some(net)
}

fn float_roi(net: f64, amount: f64) -> f64 {
    if amount == 0.0 {
        return 0.0;
    }
    let roi = 100.0 * net / amount;
    if roi.is_finite() { roi } else { 0.0 }
}

fn to_decimal(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value)
}
