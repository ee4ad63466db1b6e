//! Signal — an immutable tap-then-gap event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::direction::{ExpectedDirection, FvgDirection};
use super::level::LevelId;
use super::timeframe::Timeframe;

/// Emitted once per (level, tap) when a gap in the expected direction forms on
/// the confirmation timeframe after the level was tapped on the trigger
/// timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub trigger_timeframe: Timeframe,
    pub confirm_timeframe: Timeframe,
    pub level_id: LevelId,
    pub level_price: f64,
    /// Close of the trigger candle that tapped the level.
    pub trigger_price: f64,
    pub tap_timestamp: DateTime<Utc>,
    pub fvg_direction: FvgDirection,
    pub fvg_timestamp: DateTime<Utc>,
    pub gap_low: f64,
    pub gap_high: f64,
    pub gap_size: f64,
    pub expected_direction: ExpectedDirection,
}
