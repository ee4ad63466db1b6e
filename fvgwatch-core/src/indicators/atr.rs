//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|), ignoring
//! terms that are NaN (the first candle has no previous close).
//! ATR is the simple rolling mean of TR.
//! Lookback: period - 1.

use super::Indicator;
use crate::domain::Candle;
use crate::series::{rolling_mean, SeriesOutput};

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            name: format!("atr_{period}"),
        }
    }
}

/// Compute the True Range series.
/// TR[0] = high[0] - low[0] (no previous close).
/// TR[t] = max(high[t]-low[t], |high[t]-close[t-1]|, |low[t]-close[t-1]|).
/// NaN terms are skipped; a TR is NaN only if every term is.
pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let prev_close = if i == 0 {
                f64::NAN
            } else {
                candles[i - 1].close
            };
            [
                c.high - c.low,
                (c.high - prev_close).abs(),
                (c.low - prev_close).abs(),
            ]
            .into_iter()
            .filter(|v| !v.is_nan())
            .fold(f64::NAN, |acc, v| if acc.is_nan() { v } else { acc.max(v) })
        })
        .collect()
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, candles: &[Candle]) -> SeriesOutput {
        SeriesOutput::Single(rolling_mean(&true_range(candles), self.period))
    }
}
