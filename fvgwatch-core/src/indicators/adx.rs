//! ADX: Average Directional Index with its directional lines.
//!
//! Steps:
//! 1. +DM / -DM from consecutive highs and lows (0 when not dominant)
//! 2. ATR = SMA(TR, period)
//! 3. +DI = 100 * SMA(+DM, period) / ATR, -DI likewise
//! 4. DX = 100 * |+DI - -DI| / (+DI + -DI)
//! 5. ADX = SMA(DX, period)
//!
//! Lines, in order: adx, plus_di, minus_di.
//! Lookback: 2 * (period - 1) for the adx line.

use super::atr::true_range;
use super::{column, Indicator};
use crate::domain::Candle;
use crate::series::{diff, rolling_mean, safe_div, SeriesOutput};

#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    name: String,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ADX period must be >= 1");
        Self {
            period,
            name: format!("adx_{period}"),
        }
    }
}

fn scaled(values: Vec<f64>) -> Vec<f64> {
    values.into_iter().map(|v| 100.0 * v).collect()
}

impl Indicator for Adx {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        2 * self.period.saturating_sub(1)
    }

    fn compute(&self, candles: &[Candle]) -> SeriesOutput {
        let up_move = diff(&column(candles, |c| c.high), 1);
        let down_move: Vec<f64> = diff(&column(candles, |c| c.low), 1)
            .into_iter()
            .map(|d| -d)
            .collect();

        // NaN moves fail both comparisons and count as zero.
        let plus_dm: Vec<f64> = up_move
            .iter()
            .zip(&down_move)
            .map(|(&up, &down)| if up > down && up > 0.0 { up } else { 0.0 })
            .collect();
        let minus_dm: Vec<f64> = up_move
            .iter()
            .zip(&down_move)
            .map(|(&up, &down)| if down > up && down > 0.0 { down } else { 0.0 })
            .collect();

        let atr = rolling_mean(&true_range(candles), self.period);
        let plus_di = scaled(safe_div(&rolling_mean(&plus_dm, self.period), &atr));
        let minus_di = scaled(safe_div(&rolling_mean(&minus_dm, self.period), &atr));

        let spread: Vec<f64> = plus_di
            .iter()
            .zip(&minus_di)
            .map(|(p, m)| (p - m).abs())
            .collect();
        let total: Vec<f64> = plus_di.iter().zip(&minus_di).map(|(p, m)| p + m).collect();
        let dx = scaled(safe_div(&spread, &total));
        let adx = rolling_mean(&dx, self.period);

        SeriesOutput::Multi(vec![
            ("adx".to_string(), adx),
            ("plus_di".to_string(), plus_di),
            ("minus_di".to_string(), minus_di),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};
    use chrono::{Duration, TimeZone, Utc};

    fn make_ohlc_candles(data: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        data.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| {
                Candle::new(base + Duration::hours(i as i64), open, high, low, close, 1000.0)
            })
            .collect()
    }

    fn sample() -> Vec<Candle> {
        make_ohlc_candles(&[
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 108.0, 100.0, 106.0),
            (106.0, 107.0, 98.0, 99.0),
            (99.0, 103.0, 97.0, 101.0),
            (101.0, 106.0, 100.0, 105.0),
            (105.0, 110.0, 103.0, 108.0),
            (108.0, 112.0, 106.0, 110.0),
            (110.0, 111.0, 104.0, 105.0),
            (105.0, 109.0, 103.0, 107.0),
            (107.0, 113.0, 105.0, 112.0),
        ])
    }

    #[test]
    fn adx_bounds() {
        let out = Adx::new(3).compute(&sample());
        for name in ["adx", "plus_di", "minus_di"] {
            for (i, &v) in out.get(name).unwrap().iter().enumerate() {
                if !v.is_nan() {
                    assert!((0.0..=100.0).contains(&v), "{name} out of bounds at {i}: {v}");
                }
            }
        }
    }

    #[test]
    fn adx_warmup() {
        let out = Adx::new(3).compute(&sample());
        let adx = out.get("adx").unwrap();
        let lookback = Adx::new(3).lookback();
        assert_eq!(lookback, 4);
        assert!(adx[..lookback].iter().all(|v| v.is_nan()));
        assert!(!adx[lookback].is_nan());
        assert!(!out.get("plus_di").unwrap()[2].is_nan());
    }

    #[test]
    fn pure_uptrend_has_no_minus_di() {
        let data: Vec<(f64, f64, f64, f64)> = (0..8)
            .map(|i| {
                let base = 100.0 + 2.0 * i as f64;
                (base, base + 1.0, base - 1.0, base + 0.5)
            })
            .collect();
        let out = Adx::new(2).compute(&make_ohlc_candles(&data));
        let minus = out.get("minus_di").unwrap();
        assert_approx(minus[5], 0.0, DEFAULT_EPSILON);
        assert_approx(out.get("adx").unwrap()[5], 100.0, 1e-9);
    }
}
