//! Moving Average Convergence/Divergence (MACD).
//!
//! macd = EMA(close, fast) - EMA(close, slow)
//! signal = EMA(macd, signal)
//! histogram = macd - signal

use super::{column, Indicator};
use crate::domain::Candle;
use crate::series::{ewm_mean, SeriesOutput};

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
    name: String,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(
            fast >= 1 && slow >= 1 && signal >= 1,
            "MACD periods must be >= 1"
        );
        Self {
            fast,
            slow,
            signal,
            name: format!("macd_{fast}_{slow}_{signal}"),
        }
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, candles: &[Candle]) -> SeriesOutput {
        let closes = column(candles, |c| c.close);
        let fast = ewm_mean(&closes, self.fast as f64);
        let slow = ewm_mean(&closes, self.slow as f64);

        let macd: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = ewm_mean(&macd, self.signal as f64);
        let histogram = macd.iter().zip(&signal).map(|(m, s)| m - s).collect();

        SeriesOutput::Multi(vec![
            ("macd".to_string(), macd),
            ("signal".to_string(), signal),
            ("histogram".to_string(), histogram),
        ])
    }
}
