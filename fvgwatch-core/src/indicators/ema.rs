//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * close[t] + (1 - alpha) * EMA[t-1], with
//! alpha = 2 / (period + 1).
//! Seed: EMA[0] = close[0], so there is no warmup gap.
//! Lookback: 0.

use super::{column, Indicator};
use crate::domain::Candle;
use crate::series::{ewm_mean, SeriesOutput};

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    name: String,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self {
            period,
            name: format!("ema_{period}"),
        }
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, candles: &[Candle]) -> SeriesOutput {
        let closes = column(candles, |c| c.close);
        SeriesOutput::Single(ewm_mean(&closes, self.period as f64))
    }
}
