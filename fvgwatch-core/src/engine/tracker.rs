//! Per-level tap detection with a monotonic scan cursor.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{completed, last_completed_close, Candle, ExpectedDirection, LevelId, PriceLevel};

/// A level that was traded through and awaits confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapState {
    pub level_id: LevelId,
    /// Index of the tapping candle within the series it was found in.
    pub tap_index: usize,
    pub tap_timestamp: DateTime<Utc>,
    /// The level price at tap time.
    pub tap_price: f64,
    /// Close of the tapping candle.
    pub tap_close: f64,
    pub expected_direction: ExpectedDirection,
}

/// Finds taps on the trigger series and holds them until they are consumed.
///
/// Each level carries a cursor: the timestamp of the newest completed trigger
/// candle already scanned for it. Later scans only look at candles strictly
/// newer than the cursor, so a re-fetched window that overlaps an earlier one
/// never produces a second tap from the same candle.
#[derive(Debug, Clone, Default)]
pub struct PriceLevelTracker {
    taps: HashMap<LevelId, TapState>,
    cursors: HashMap<LevelId, DateTime<Utc>>,
}

impl PriceLevelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `trigger` for new taps and return the ids tapped by this call.
    ///
    /// Levels that are disabled, triggered, priced invalidly, or already
    /// holding a tap are skipped. The expected direction is classified against
    /// the last completed close.
    pub fn scan(&mut self, trigger: &[Candle], levels: &[PriceLevel]) -> Vec<LevelId> {
        let mut tapped = Vec::new();
        let Some(close) = last_completed_close(trigger) else {
            return tapped;
        };
        let closed = completed(trigger);
        let Some(newest) = closed.last().map(|c| c.timestamp) else {
            return tapped;
        };

        for level in levels {
            if !level.is_armed() || !level.has_valid_price() || self.taps.contains_key(&level.id) {
                continue;
            }

            let cursor = self.cursors.get(&level.id).copied();
            let hit = closed
                .iter()
                .enumerate()
                .filter(|(_, c)| cursor.map_or(true, |t| c.timestamp > t))
                .find(|(_, c)| c.contains_price(level.price));

            match hit {
                Some((index, candle)) => {
                    let state = TapState {
                        level_id: level.id,
                        tap_index: index,
                        tap_timestamp: candle.timestamp,
                        tap_price: level.price,
                        tap_close: candle.close,
                        expected_direction: ExpectedDirection::for_level(level.price, close),
                    };
                    debug!(
                        level = %level.id,
                        price = level.price,
                        tapped_at = %candle.timestamp,
                        expected = %state.expected_direction,
                        "level tapped"
                    );
                    self.advance_cursor(level.id, candle.timestamp);
                    self.taps.insert(level.id, state);
                    tapped.push(level.id);
                }
                None => self.advance_cursor(level.id, newest),
            }
        }

        tapped
    }

    fn advance_cursor(&mut self, id: LevelId, to: DateTime<Utc>) {
        let cursor = self.cursors.entry(id).or_insert(to);
        if to > *cursor {
            *cursor = to;
        }
    }

    pub fn tap(&self, id: LevelId) -> Option<&TapState> {
        self.taps.get(&id)
    }

    pub fn cursor(&self, id: LevelId) -> Option<DateTime<Utc>> {
        self.cursors.get(&id).copied()
    }

    /// Remove and return a tap (it is consumed, never reused).
    pub fn take(&mut self, id: LevelId) -> Option<TapState> {
        self.taps.remove(&id)
    }

    /// Pending taps, in no particular order.
    pub fn pending(&self) -> impl Iterator<Item = &TapState> {
        self.taps.values()
    }

    pub fn pending_count(&self) -> usize {
        self.taps.len()
    }

    /// Drop all state for levels not in `keep`.
    pub fn retain(&mut self, keep: impl Fn(LevelId) -> bool) {
        self.taps.retain(|id, _| keep(*id));
        self.cursors.retain(|id, _| keep(*id));
    }

    /// Clear all state for one level, cursor included.
    pub fn forget(&mut self, id: LevelId) {
        self.taps.remove(&id);
        self.cursors.remove(&id);
    }
}
