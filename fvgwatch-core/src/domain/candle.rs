//! Candle — the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV sample for one symbol on one timeframe.
///
/// Series are ordered ascending by `timestamp`. The last candle of any fetched
/// series is still forming and must never take part in pattern analysis; use
/// [`completed`] to get the closed prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// True if `price` lies inside the inclusive `[low, high]` range.
    #[inline]
    pub fn contains_price(&self, price: f64) -> bool {
        self.low <= price && price <= self.high
    }

    /// Returns true if any OHLC field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low and the body sits inside the range.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= 0.0
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Body size as a percentage of the full range, rounded to two decimals.
    /// A zero-range candle reports 0.
    pub fn body_percentage(&self) -> f64 {
        let range = self.high - self.low;
        if range == 0.0 {
            return 0.0;
        }
        let pct = (self.close - self.open).abs() / range * 100.0;
        (pct * 100.0).round() / 100.0
    }
}

/// The closed prefix of a fetched series (everything but the provisional last
/// candle). Empty input stays empty.
pub fn completed(candles: &[Candle]) -> &[Candle] {
    match candles.split_last() {
        Some((_, head)) => head,
        None => candles,
    }
}

/// Close of the last completed candle, used as "current price".
/// Needs at least two candles (one completed plus the live one).
pub fn last_completed_close(candles: &[Candle]) -> Option<f64> {
    if candles.len() < 2 {
        return None;
    }
    completed(candles).last().map(|c| c.close)
}
