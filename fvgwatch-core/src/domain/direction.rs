//! Gap direction and the direction a tapped level expects to be confirmed by.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a Fair Value Gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FvgDirection {
    Bullish,
    Bearish,
}

impl fmt::Display for FvgDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FvgDirection::Bullish => f.write_str("Bullish"),
            FvgDirection::Bearish => f.write_str("Bearish"),
        }
    }
}

/// FVG direction a tapped level must be confirmed with.
///
/// `Either` means the level sat within 0.1% of price when tapped, so both
/// directions confirm it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpectedDirection {
    Bullish,
    Bearish,
    Either,
}

impl ExpectedDirection {
    /// Upper band: a level above `close * (1 + BAND)` acts as resistance.
    pub const BAND: f64 = 0.001;

    /// Classify a level against the last completed close.
    pub fn for_level(level_price: f64, close: f64) -> Self {
        if level_price > close * (1.0 + Self::BAND) {
            ExpectedDirection::Bearish
        } else if level_price < close * (1.0 - Self::BAND) {
            ExpectedDirection::Bullish
        } else {
            ExpectedDirection::Either
        }
    }

    /// Direction filter to hand to the detector (`None` = both).
    pub fn filter(&self) -> Option<FvgDirection> {
        match self {
            ExpectedDirection::Bullish => Some(FvgDirection::Bullish),
            ExpectedDirection::Bearish => Some(FvgDirection::Bearish),
            ExpectedDirection::Either => None,
        }
    }

    pub fn accepts(&self, direction: FvgDirection) -> bool {
        self.filter().map_or(true, |d| d == direction)
    }
}

impl fmt::Display for ExpectedDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedDirection::Bullish => f.write_str("Bullish"),
            ExpectedDirection::Bearish => f.write_str("Bearish"),
            ExpectedDirection::Either => f.write_str("Any"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_policy_boundaries() {
        let close = 100.0;
        assert_eq!(
            ExpectedDirection::for_level(close * 1.0015, close),
            ExpectedDirection::Bearish
        );
        assert_eq!(
            ExpectedDirection::for_level(close * 0.9985, close),
            ExpectedDirection::Bullish
        );
        assert_eq!(
            ExpectedDirection::for_level(close, close),
            ExpectedDirection::Either
        );
    }

    #[test]
    fn resistance_above_support_below() {
        assert_eq!(
            ExpectedDirection::for_level(101.0, 95.0),
            ExpectedDirection::Bearish
        );
        assert_eq!(
            ExpectedDirection::for_level(90.0, 95.0),
            ExpectedDirection::Bullish
        );
    }

    #[test]
    fn filter_and_accepts() {
        assert_eq!(ExpectedDirection::Either.filter(), None);
        assert!(ExpectedDirection::Either.accepts(FvgDirection::Bearish));
        assert!(ExpectedDirection::Bullish.accepts(FvgDirection::Bullish));
        assert!(!ExpectedDirection::Bullish.accepts(FvgDirection::Bearish));
    }
}
