//! Bollinger Bands: moving average +/- a standard deviation multiple.
//!
//! - upper: middle + mult * stddev(close, period)
//! - middle: SMA(close, period)
//! - lower: middle - mult * stddev(close, period)
//!
//! Uses the sample standard deviation (divide by N - 1).
//! Lookback: period - 1.

use super::{column, Indicator};
use crate::domain::Candle;
use crate::series::{rolling_mean, rolling_std, SeriesOutput};

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    multiplier: f64,
    name: String,
}

impl Bollinger {
    pub fn new(period: usize, multiplier: f64) -> Self {
        assert!(period >= 1, "Bollinger period must be >= 1");
        Self {
            period,
            multiplier,
            name: format!("bollinger_{period}_{multiplier}"),
        }
    }
}

impl Indicator for Bollinger {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, candles: &[Candle]) -> SeriesOutput {
        let closes = column(candles, |c| c.close);
        let middle = rolling_mean(&closes, self.period);
        let sd = rolling_std(&closes, self.period);

        let upper = middle
            .iter()
            .zip(&sd)
            .map(|(m, s)| m + s * self.multiplier)
            .collect();
        let lower = middle
            .iter()
            .zip(&sd)
            .map(|(m, s)| m - s * self.multiplier)
            .collect();

        SeriesOutput::Multi(vec![
            ("upper".to_string(), upper),
            ("middle".to_string(), middle),
            ("lower".to_string(), lower),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn bands_around_mean() {
        let candles = make_candles(&[1.0, 2.0, 3.0]);
        let out = Bollinger::new(3, 2.0).compute(&candles);
        // mean 2, sample std 1
        assert_approx(out.get("middle").unwrap()[2], 2.0, DEFAULT_EPSILON);
        assert_approx(out.get("upper").unwrap()[2], 4.0, DEFAULT_EPSILON);
        assert_approx(out.get("lower").unwrap()[2], 0.0, DEFAULT_EPSILON);
        assert!(out.get("upper").unwrap()[1].is_nan());
    }

    #[test]
    fn constant_series_collapses_bands() {
        let candles = make_candles(&[100.0; 6]);
        let out = Bollinger::new(4, 2.0).compute(&candles);
        assert_approx(out.get("upper").unwrap()[5], 100.0, DEFAULT_EPSILON);
        assert_approx(out.get("lower").unwrap()[5], 100.0, DEFAULT_EPSILON);
    }

    #[test]
    fn upper_is_the_main_line() {
        let candles = make_candles(&[1.0, 2.0, 3.0, 4.0]);
        let out = Bollinger::new(2, 1.0).compute(&candles);
        assert_eq!(out.names(), vec!["upper", "middle", "lower"]);
        let main = out.line(None).unwrap();
        let upper = out.get("upper").unwrap();
        assert!(std::ptr::eq(main, upper));
        assert!(main[0].is_nan());
        assert_approx(main[3], 3.5 + 0.5_f64.sqrt(), DEFAULT_EPSILON);
    }
}
