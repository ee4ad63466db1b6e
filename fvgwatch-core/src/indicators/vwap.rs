//! Volume Weighted Average Price (VWAP), cumulative from the first candle.
//!
//! vwap = cumsum(typical * volume) / cumsum(volume), typical = (h + l + c) / 3

use super::Indicator;
use crate::domain::Candle;
use crate::series::{cumsum, safe_div, SeriesOutput};

#[derive(Debug, Clone, Default)]
pub struct Vwap;

impl Vwap {
    pub fn new() -> Self {
        Self
    }
}

impl Indicator for Vwap {
    fn name(&self) -> &str {
        "vwap"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, candles: &[Candle]) -> SeriesOutput {
        let weighted: Vec<f64> = candles
            .iter()
            .map(|c| (c.high + c.low + c.close) / 3.0 * c.volume)
            .collect();
        let volume: Vec<f64> = candles.iter().map(|c| c.volume).collect();
        SeriesOutput::Single(safe_div(&cumsum(&weighted), &cumsum(&volume)))
    }
}
