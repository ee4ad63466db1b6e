//! User-defined price levels watched for taps.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a price level (assigned by the level store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelId(pub u64);

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub const DEFAULT_LEVEL_COLOR: &str = "#2962FF";

/// A watched price level.
///
/// `triggered` flips to true exactly once, when a signal fires for the level.
/// A triggered level is never scanned for taps again until the owner resets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub id: LevelId,
    pub price: f64,
    #[serde(default)]
    pub label: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub triggered: bool,
}

fn default_color() -> String {
    DEFAULT_LEVEL_COLOR.to_string()
}

fn default_true() -> bool {
    true
}

impl PriceLevel {
    pub fn new(id: u64, price: f64) -> Self {
        Self {
            id: LevelId(id),
            price,
            label: String::new(),
            color: default_color(),
            enabled: true,
            triggered: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Enabled and not yet triggered.
    pub fn is_armed(&self) -> bool {
        self.enabled && !self.triggered
    }

    /// Usable as a level at all: finite and strictly positive.
    pub fn has_valid_price(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_level_is_armed() {
        let level = PriceLevel::new(1, 101.0);
        assert!(level.is_armed());
        assert_eq!(level.color, DEFAULT_LEVEL_COLOR);
    }

    #[test]
    fn triggered_or_disabled_is_not_armed() {
        let mut level = PriceLevel::new(1, 101.0);
        level.triggered = true;
        assert!(!level.is_armed());
        level.triggered = false;
        level.enabled = false;
        assert!(!level.is_armed());
    }

    #[test]
    fn invalid_prices() {
        assert!(!PriceLevel::new(1, f64::NAN).has_valid_price());
        assert!(!PriceLevel::new(1, 0.0).has_valid_price());
        assert!(!PriceLevel::new(1, -5.0).has_valid_price());
        assert!(PriceLevel::new(1, 0.0001).has_valid_price());
    }

    #[test]
    fn deserialize_with_defaults() {
        let level: PriceLevel = serde_json::from_str(r#"{"id": 7, "price": 42.5}"#).unwrap();
        assert_eq!(level.id, LevelId(7));
        assert!(level.enabled);
        assert!(!level.triggered);
        assert_eq!(level.color, DEFAULT_LEVEL_COLOR);
    }
}
