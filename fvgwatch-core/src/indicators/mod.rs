//! Built-in indicator library.
//!
//! Every indicator implements [`Indicator`]: candles in, a [`SeriesOutput`]
//! of the same length out. Multi-line indicators (MACD, Bollinger,
//! Stochastic, ADX) return their lines as one named frame, in a fixed order,
//! so alert rules can address them by name.
//!
//! Formulas follow common dataframe semantics: simple rolling windows, sample
//! standard deviation, and `span`-based exponential means seeded with the
//! first value. Ratios with a zero denominator are NaN.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod library;
pub mod macd;
pub mod obv;
pub mod rsi;
pub mod sma;
pub mod stochastic;
pub mod vwap;

pub use adx::Adx;
pub use atr::Atr;
pub use bollinger::Bollinger;
pub use ema::Ema;
pub use library::{builtin_library, BuiltinKind, IndicatorDescriptor, IndicatorSource, Params};
pub use macd::Macd;
pub use obv::Obv;
pub use rsi::Rsi;
pub use sma::Sma;
pub use stochastic::Stochastic;
pub use vwap::Vwap;

use crate::domain::Candle;
use crate::series::SeriesOutput;

/// Trait for built-in indicators.
///
/// # Look-ahead guard
/// No output at index t may depend on candles after t. Truncating the input
/// must never change the overlapping prefix of the output.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20", "macd_12_26_9").
    fn name(&self) -> &str;

    /// Number of leading NaN outputs before the main line becomes valid.
    fn lookback(&self) -> usize;

    fn compute(&self, candles: &[Candle]) -> SeriesOutput;
}

/// One OHLCV field as a plain series.
pub(crate) fn column(candles: &[Candle], field: fn(&Candle) -> f64) -> Vec<f64> {
    candles.iter().map(field).collect()
}

/// Synthetic candles from close prices, one hour apart.
///
/// open = prev_close (or close for the first), high = max(open, close) + 1,
/// low = min(open, close) - 1, volume = 1000.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    use chrono::{Duration, TimeZone, Utc};
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle::new(
                base + Duration::hours(i as i64),
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
                1000.0,
            )
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

/// Unwrap a single-series output in tests.
#[cfg(test)]
pub fn single(output: SeriesOutput) -> Vec<f64> {
    match output {
        SeriesOutput::Single(values) => values,
        SeriesOutput::Multi(_) => panic!("expected a single series"),
    }
}
