//! Pattern detection over completed candles.
//!
//! Everything here is a pure function of its input series: no state survives
//! between calls, and the provisional last candle never takes part.

pub mod fvg;
pub mod swing;

pub use fvg::{detect_fvg, Fvg, Recommendation, TradeAction, DEFAULT_START_OFFSET};
pub use swing::{swing_levels, SwingKind, SwingLevel};

/// Candles built from (high, low) pairs, one minute apart, with a trailing
/// live candle appended when `with_live` is set.
#[cfg(test)]
pub(crate) fn hl_candles(pairs: &[(f64, f64)], with_live: bool) -> Vec<crate::domain::Candle> {
    use crate::domain::Candle;
    use chrono::{Duration, TimeZone, Utc};

    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let mut out: Vec<Candle> = pairs
        .iter()
        .enumerate()
        .map(|(i, &(high, low))| {
            let mid = (high + low) / 2.0;
            Candle::new(base + Duration::minutes(i as i64), mid, high, low, mid, 100.0)
        })
        .collect();
    if with_live {
        let last = out.last().map(|c| c.close).unwrap_or(100.0);
        out.push(Candle::new(
            base + Duration::minutes(pairs.len() as i64),
            last,
            last,
            last,
            last,
            0.0,
        ));
    }
    out
}
