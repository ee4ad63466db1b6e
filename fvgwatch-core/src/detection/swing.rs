//! Swing highs and lows as candidate price levels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{completed, Candle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingKind {
    Resistance,
    Support,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingLevel {
    pub kind: SwingKind,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// Find swing points among completed candles.
///
/// Candle `i` is a resistance when its high is the maximum high of the
/// `2 * window + 1` candles centred on it, and a support when its low is the
/// minimum low of that window. A candle can be both. Needs more than `window`
/// input candles; only indices with a full window on both sides are checked.
pub fn swing_levels(candles: &[Candle], window: usize) -> Vec<SwingLevel> {
    let mut levels = Vec::new();
    if candles.len() < window + 1 {
        return levels;
    }

    let closed = completed(candles);
    if closed.len() <= 2 * window {
        return levels;
    }

    for i in window..closed.len() - window {
        let span = &closed[i - window..=i + window];
        let c = &closed[i];

        let max_high = span.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        if c.high == max_high {
            levels.push(SwingLevel {
                kind: SwingKind::Resistance,
                price: c.high,
                timestamp: c.timestamp,
            });
        }

        let min_low = span.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        if c.low == min_low {
            levels.push(SwingLevel {
                kind: SwingKind::Support,
                price: c.low,
                timestamp: c.timestamp,
            });
        }
    }

    levels
}
