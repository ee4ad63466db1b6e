//! Relative Strength Index (RSI).
//!
//! Simple rolling means of gains and losses over `period` changes.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! The first change (no previous close) counts as zero movement, so the
//! first value lands at index period-1.
//! Edge case: avg_loss == 0 → NaN.

use super::{column, Indicator};
use crate::domain::Candle;
use crate::series::{diff, rolling_mean, safe_div, SeriesOutput};

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self {
            period,
            name: format!("rsi_{period}"),
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, candles: &[Candle]) -> SeriesOutput {
        let changes = diff(&column(candles, |c| c.close), 1);

        // NaN changes compare false on both sides and count as zero.
        let gains: Vec<f64> = changes
            .iter()
            .map(|&ch| if ch > 0.0 { ch } else { 0.0 })
            .collect();
        let losses: Vec<f64> = changes
            .iter()
            .map(|&ch| if ch < 0.0 { -ch } else { 0.0 })
            .collect();

        let rs = safe_div(
            &rolling_mean(&gains, self.period),
            &rolling_mean(&losses, self.period),
        );
        SeriesOutput::Single(rs.iter().map(|r| 100.0 - 100.0 / (1.0 + r)).collect())
    }
}
