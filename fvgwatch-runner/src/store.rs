//! Level storage.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use fvgwatch_core::domain::{LevelId, PriceLevel};

/// Most levels one symbol may watch.
pub const MAX_LEVELS: usize = 50;

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("level {id} not found for {symbol}")]
    UnknownLevel { symbol: String, id: LevelId },

    #[error("{symbol} already has {MAX_LEVELS} levels")]
    TooManyLevels { symbol: String },

    #[error("level price must be finite and positive, got {0}")]
    InvalidPrice(f64),

    #[error("level {0} already exists")]
    DuplicateLevel(LevelId),

    #[error("level store lock poisoned")]
    Poisoned,
}

/// Where levels live between ticks. Implementations must tolerate being
/// shared by monitors on several threads.
pub trait LevelStore: Send + Sync {
    fn load_levels(&self, symbol: &str) -> Result<Vec<PriceLevel>, StoreError>;

    fn mark_triggered(&self, symbol: &str, id: LevelId) -> Result<(), StoreError>;
}

/// In-process store keyed by symbol.
#[derive(Debug, Default)]
pub struct MemoryLevelStore {
    levels: Mutex<HashMap<String, Vec<PriceLevel>>>,
}

impl MemoryLevelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_level(&self, symbol: &str, level: PriceLevel) -> Result<(), StoreError> {
        if !level.has_valid_price() {
            return Err(StoreError::InvalidPrice(level.price));
        }
        let mut all = self.levels.lock().map_err(|_| StoreError::Poisoned)?;
        let levels = all.entry(symbol.to_string()).or_default();
        if levels.iter().any(|l| l.id == level.id) {
            return Err(StoreError::DuplicateLevel(level.id));
        }
        if levels.len() >= MAX_LEVELS {
            return Err(StoreError::TooManyLevels {
                symbol: symbol.to_string(),
            });
        }
        levels.push(level);
        Ok(())
    }

    pub fn remove_level(&self, symbol: &str, id: LevelId) -> Result<PriceLevel, StoreError> {
        let mut all = self.levels.lock().map_err(|_| StoreError::Poisoned)?;
        let levels = all.get_mut(symbol);
        let pos = levels
            .as_ref()
            .and_then(|ls| ls.iter().position(|l| l.id == id));
        match (levels, pos) {
            (Some(levels), Some(pos)) => Ok(levels.remove(pos)),
            _ => Err(StoreError::UnknownLevel {
                symbol: symbol.to_string(),
                id,
            }),
        }
    }

    /// Re-arm a triggered level.
    pub fn reset_level(&self, symbol: &str, id: LevelId) -> Result<(), StoreError> {
        self.update(symbol, id, |l| l.triggered = false)
    }

    fn update(
        &self,
        symbol: &str,
        id: LevelId,
        f: impl FnOnce(&mut PriceLevel),
    ) -> Result<(), StoreError> {
        let mut all = self.levels.lock().map_err(|_| StoreError::Poisoned)?;
        let level = all
            .get_mut(symbol)
            .and_then(|ls| ls.iter_mut().find(|l| l.id == id))
            .ok_or_else(|| StoreError::UnknownLevel {
                symbol: symbol.to_string(),
                id,
            })?;
        f(level);
        Ok(())
    }
}

impl LevelStore for MemoryLevelStore {
    fn load_levels(&self, symbol: &str) -> Result<Vec<PriceLevel>, StoreError> {
        let all = self.levels.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(all.get(symbol).cloned().unwrap_or_default())
    }

    fn mark_triggered(&self, symbol: &str, id: LevelId) -> Result<(), StoreError> {
        self.update(symbol, id, |l| l.triggered = true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_load_mark_reset() {
        let store = MemoryLevelStore::new();
        store.add_level("BTC", PriceLevel::new(1, 100.0)).unwrap();
        store.add_level("BTC", PriceLevel::new(2, 110.0)).unwrap();

        store.mark_triggered("BTC", LevelId(2)).unwrap();
        let levels = store.load_levels("BTC").unwrap();
        assert!(!levels[0].triggered);
        assert!(levels[1].triggered);

        store.reset_level("BTC", LevelId(2)).unwrap();
        assert!(!store.load_levels("BTC").unwrap()[1].triggered);
        assert!(store.load_levels("ETH").unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_levels() {
        let store = MemoryLevelStore::new();
        assert_eq!(
            store.add_level("BTC", PriceLevel::new(1, -1.0)),
            Err(StoreError::InvalidPrice(-1.0))
        );
        store.add_level("BTC", PriceLevel::new(1, 1.0)).unwrap();
        assert_eq!(
            store.add_level("BTC", PriceLevel::new(1, 2.0)),
            Err(StoreError::DuplicateLevel(LevelId(1)))
        );
        assert!(matches!(
            store.mark_triggered("BTC", LevelId(9)),
            Err(StoreError::UnknownLevel { .. })
        ));
    }

    #[test]
    fn level_cap() {
        let store = MemoryLevelStore::new();
        for id in 0..MAX_LEVELS as u64 {
            store.add_level("BTC", PriceLevel::new(id, 100.0 + id as f64)).unwrap();
        }
        assert!(matches!(
            store.add_level("BTC", PriceLevel::new(999, 1.0)),
            Err(StoreError::TooManyLevels { .. })
        ));
        store.remove_level("BTC", LevelId(0)).unwrap();
        assert!(store.add_level("BTC", PriceLevel::new(999, 1.0)).is_ok());
    }
}
