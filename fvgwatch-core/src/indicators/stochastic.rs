//! Stochastic Oscillator.
//!
//! k = 100 * (close - lowest_low(k_period)) / (highest_high(k_period) - lowest_low(k_period))
//! d = SMA(k, d_period)
//! A flat window (zero range) gives NaN.

use super::{column, Indicator};
use crate::domain::Candle;
use crate::series::{rolling_max, rolling_mean, rolling_min, safe_div, SeriesOutput};

#[derive(Debug, Clone)]
pub struct Stochastic {
    k_period: usize,
    d_period: usize,
    name: String,
}

impl Stochastic {
    pub fn new(k_period: usize, d_period: usize) -> Self {
        assert!(
            k_period >= 1 && d_period >= 1,
            "Stochastic periods must be >= 1"
        );
        Self {
            k_period,
            d_period,
            name: format!("stoch_{k_period}_{d_period}"),
        }
    }
}

impl Indicator for Stochastic {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.k_period.saturating_sub(1)
    }

    fn compute(&self, candles: &[Candle]) -> SeriesOutput {
        let closes = column(candles, |c| c.close);
        let low_min = rolling_min(&column(candles, |c| c.low), self.k_period);
        let high_max = rolling_max(&column(candles, |c| c.high), self.k_period);

        let above_low: Vec<f64> = closes.iter().zip(&low_min).map(|(c, l)| c - l).collect();
        let range: Vec<f64> = high_max.iter().zip(&low_min).map(|(h, l)| h - l).collect();
        let k: Vec<f64> = safe_div(&above_low, &range)
            .into_iter()
            .map(|r| 100.0 * r)
            .collect();
        let d = rolling_mean(&k, self.d_period);

        SeriesOutput::Multi(vec![("k".to_string(), k), ("d".to_string(), d)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn close_at_top_of_range_is_100() {
        let mut candles = make_candles(&[10.0, 11.0, 12.0]);
        for c in &mut candles {
            c.high = c.close;
            c.low = c.close - 2.0;
        }
        let out = Stochastic::new(3, 1).compute(&candles);
        let k = out.get("k").unwrap();
        assert!(k[1].is_nan());
        assert_approx(k[2], 100.0, DEFAULT_EPSILON);
        assert_approx(out.get("d").unwrap()[2], 100.0, DEFAULT_EPSILON);
    }

    #[test]
    fn d_smooths_k() {
        let candles = make_candles(&[10.0, 12.0, 11.0, 13.0, 12.0]);
        let out = Stochastic::new(2, 2).compute(&candles);
        let k = out.get("k").unwrap();
        let d = out.get("d").unwrap();
        assert!(d[1].is_nan());
        assert_approx(d[3], (k[2] + k[3]) / 2.0, DEFAULT_EPSILON);
    }

    #[test]
    fn flat_range_is_nan() {
        let mut candles = make_candles(&[10.0; 3]);
        for c in &mut candles {
            c.high = 10.0;
            c.low = 10.0;
        }
        let out = Stochastic::new(2, 1).compute(&candles);
        assert!(out.get("k").unwrap()[2].is_nan());
    }
}
