//! Fair Value Gap detection.
//!
//! A gap forms at candle `i` when the ranges of candles `i-2` and `i` do not
//! overlap:
//! - Bullish: `high[i-2] < low[i]`, gap = `[high[i-2], low[i]]`
//! - Bearish: `low[i-2] > high[i]`, gap = `[high[i], low[i-2]]`
//!
//! No minimum size is applied here; callers post-filter on `gap_size`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{completed, Candle, FvgDirection};

/// Default first forming index (the earliest index with two predecessors).
pub const DEFAULT_START_OFFSET: usize = 2;

/// Minimum input length, counting the provisional last candle.
const MIN_INPUT_CANDLES: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fvg {
    pub direction: FvgDirection,
    /// Index of the third (forming) candle within the analysed series.
    pub forming_index: usize,
    /// Timestamp of the forming candle.
    pub timestamp: DateTime<Utc>,
    pub gap_low: f64,
    pub gap_high: f64,
    pub gap_size: f64,
    pub candles: [Candle; 3],
}

/// Scan `candles` for gaps.
///
/// The last candle is treated as live and dropped. Fewer than four input
/// candles (three completed) yields an empty result. Gaps are reported in
/// ascending index order starting at `max(2, start_offset)`; `filter`
/// suppresses the other direction.
pub fn detect_fvg(
    candles: &[Candle],
    filter: Option<FvgDirection>,
    start_offset: usize,
) -> Vec<Fvg> {
    let mut gaps = Vec::new();
    if candles.len() < MIN_INPUT_CANDLES {
        return gaps;
    }

    let closed = completed(candles);
    if closed.len() < 3 {
        return gaps;
    }

    let wants = |d: FvgDirection| filter.map_or(true, |f| f == d);

    for i in start_offset.max(2)..closed.len() {
        let first = &closed[i - 2];
        let third = &closed[i];

        let found = if first.high < third.low {
            Some((FvgDirection::Bullish, first.high, third.low))
        } else if first.low > third.high {
            Some((FvgDirection::Bearish, third.high, first.low))
        } else {
            None
        };

        if let Some((direction, gap_low, gap_high)) = found {
            if wants(direction) {
                gaps.push(Fvg {
                    direction,
                    forming_index: i,
                    timestamp: third.timestamp,
                    gap_low,
                    gap_high,
                    gap_size: gap_high - gap_low,
                    candles: [first.clone(), closed[i - 1].clone(), third.clone()],
                });
            }
        }
    }

    gaps
}

/// Side of a suggested trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    Buy,
    Sell,
}

/// Trade idea derived from a gap: enter at the near edge, stop half a gap
/// beyond it, target two gaps past the far edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: TradeAction,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Reward / risk rounded to two decimals (0 when risk is zero).
    pub risk_reward: f64,
}

impl Fvg {
    /// Midpoint of the gap (the "consequent encroachment" level).
    pub fn midpoint(&self) -> f64 {
        (self.gap_low + self.gap_high) / 2.0
    }

    pub fn recommendation(&self) -> Recommendation {
        let size = self.gap_high - self.gap_low;
        let (action, entry, stop_loss, take_profit) = match self.direction {
            FvgDirection::Bullish => (
                TradeAction::Buy,
                self.gap_low,
                self.gap_low - size * 0.5,
                self.gap_high + size * 2.0,
            ),
            FvgDirection::Bearish => (
                TradeAction::Sell,
                self.gap_high,
                self.gap_high + size * 0.5,
                self.gap_low - size * 2.0,
            ),
        };

        let risk = (entry - stop_loss).abs();
        let reward = (take_profit - entry).abs();
        let risk_reward = if risk > 0.0 {
            (reward / risk * 100.0).round() / 100.0
        } else {
            0.0
        };

        Recommendation {
            action,
            entry,
            stop_loss,
            take_profit,
            risk_reward,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::hl_candles;

    #[test]
    fn bullish_gap_scenario() {
        let candles = hl_candles(&[(100.0, 98.0), (99.0, 95.0), (105.0, 103.0)], true);
        let gaps = detect_fvg(&candles, None, DEFAULT_START_OFFSET);

        assert_eq!(gaps.len(), 1);
        let gap = &gaps[0];
        assert_eq!(gap.direction, FvgDirection::Bullish);
        assert_eq!(gap.forming_index, 2);
        assert_eq!(gap.gap_low, 100.0);
        assert_eq!(gap.gap_high, 103.0);
        assert_eq!(gap.gap_size, 3.0);
        assert_eq!(gap.timestamp, candles[2].timestamp);
        assert_eq!(gap.candles[1].high, 99.0);
    }

    #[test]
    fn bearish_gap() {
        let candles = hl_candles(&[(110.0, 105.0), (106.0, 100.0), (102.0, 99.0)], true);
        let gaps = detect_fvg(&candles, None, DEFAULT_START_OFFSET);

        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].direction, FvgDirection::Bearish);
        assert_eq!(gaps[0].gap_low, 102.0);
        assert_eq!(gaps[0].gap_high, 105.0);
        assert_eq!(gaps[0].gap_size, 3.0);
    }

    #[test]
    fn live_candle_never_forms_a_gap() {
        // Only the last candle opens a gap against candle 1.
        let candles = hl_candles(
            &[(100.0, 98.0), (99.0, 95.0), (99.5, 96.0), (120.0, 110.0)],
            false,
        );
        assert!(detect_fvg(&candles, None, DEFAULT_START_OFFSET).is_empty());

        let mut closed = candles.clone();
        closed.push(candles[3].clone());
        assert_eq!(detect_fvg(&closed, None, DEFAULT_START_OFFSET).len(), 1);
    }

    #[test]
    fn too_few_candles_is_empty() {
        let candles = hl_candles(&[(100.0, 98.0), (99.0, 95.0)], true);
        assert_eq!(candles.len(), 3);
        assert!(detect_fvg(&candles, None, DEFAULT_START_OFFSET).is_empty());
        assert!(detect_fvg(&[], None, DEFAULT_START_OFFSET).is_empty());
    }

    /// Two bullish gaps (2, 3) followed by two bearish ones (4, 5).
    fn up_then_down() -> Vec<Candle> {
        hl_candles(
            &[
                (100.0, 98.0),
                (99.0, 95.0),
                (105.0, 103.0), // high[0]=100 < low[2]=103
                (104.0, 101.0), // high[1]=99 < low[3]=101
                (102.0, 99.0),  // low[2]=103 > high[4]=102
                (100.0, 97.0),  // low[3]=101 > high[5]=100
            ],
            true,
        )
    }

    #[test]
    fn direction_filter_suppresses_other_side() {
        let candles = up_then_down();
        let all = detect_fvg(&candles, None, DEFAULT_START_OFFSET);
        let indices: Vec<usize> = all.iter().map(|g| g.forming_index).collect();
        assert_eq!(indices, vec![2, 3, 4, 5]);

        let bulls = detect_fvg(&candles, Some(FvgDirection::Bullish), DEFAULT_START_OFFSET);
        assert_eq!(bulls.len(), 2);
        assert!(bulls.iter().all(|g| g.direction == FvgDirection::Bullish));
        assert_eq!(bulls[1].gap_low, 99.0);
        assert_eq!(bulls[1].gap_high, 101.0);

        let bears = detect_fvg(&candles, Some(FvgDirection::Bearish), DEFAULT_START_OFFSET);
        let bear_indices: Vec<usize> = bears.iter().map(|g| g.forming_index).collect();
        assert_eq!(bear_indices, vec![4, 5]);
        assert_eq!(bears[0].gap_low, 102.0);
        assert_eq!(bears[0].gap_high, 103.0);
    }

    #[test]
    fn start_offset_skips_earlier_indices() {
        let candles = up_then_down();
        let late = detect_fvg(&candles, None, 3);
        assert_eq!(late.len(), 3);
        assert_eq!(late[0].forming_index, 3);
        assert_eq!(detect_fvg(&candles, None, 5).len(), 1);
        assert!(detect_fvg(&candles, None, 6).is_empty());
        // Offsets below two are clamped.
        assert_eq!(detect_fvg(&candles, None, 0).len(), 4);
    }

    #[test]
    fn touching_ranges_are_not_gaps() {
        let candles = hl_candles(&[(100.0, 98.0), (99.0, 95.0), (105.0, 100.0)], true);
        assert!(detect_fvg(&candles, None, DEFAULT_START_OFFSET).is_empty());
    }

    #[test]
    fn bullish_recommendation() {
        let candles = hl_candles(&[(100.0, 98.0), (99.0, 95.0), (104.0, 102.0)], true);
        let gap = &detect_fvg(&candles, None, DEFAULT_START_OFFSET)[0];
        let rec = gap.recommendation();
        assert_eq!(rec.action, TradeAction::Buy);
        assert_eq!(rec.entry, 100.0);
        assert_eq!(rec.stop_loss, 99.0);
        assert_eq!(rec.take_profit, 106.0);
        assert_eq!(rec.risk_reward, 6.0);
        assert_eq!(gap.midpoint(), 101.0);
    }

    #[test]
    fn bearish_recommendation() {
        let candles = hl_candles(&[(110.0, 105.0), (106.0, 100.0), (101.0, 99.0)], true);
        let gap = &detect_fvg(&candles, None, DEFAULT_START_OFFSET)[0];
        let rec = gap.recommendation();
        assert_eq!(rec.action, TradeAction::Sell);
        assert_eq!(rec.entry, 105.0);
        assert_eq!(rec.stop_loss, 107.0);
        assert_eq!(rec.take_profit, 93.0);
        assert_eq!(rec.risk_reward, 6.0);
    }
}
