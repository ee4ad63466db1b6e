//! On Balance Volume (OBV).
//!
//! Volume is added when the close rises (and on the first candle), and
//! subtracted otherwise, including unchanged closes.

use super::{column, Indicator};
use crate::domain::Candle;
use crate::series::{cumsum, diff, SeriesOutput};

#[derive(Debug, Clone, Default)]
pub struct Obv;

impl Obv {
    pub fn new() -> Self {
        Self
    }
}

impl Indicator for Obv {
    fn name(&self) -> &str {
        "obv"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, candles: &[Candle]) -> SeriesOutput {
        let changes = diff(&column(candles, |c| c.close), 1);
        let signed: Vec<f64> = candles
            .iter()
            .zip(&changes)
            .map(|(c, &ch)| if ch <= 0.0 { -c.volume } else { c.volume })
            .collect();
        SeriesOutput::Single(cumsum(&signed))
    }
}
