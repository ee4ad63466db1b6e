//! Candle providers.
//!
//! The monitor never talks to an exchange directly; it asks a
//! [`CandleProvider`] for the latest `limit` candles of a series, the last
//! of which is the still-forming candle.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use thiserror::Error;

use fvgwatch_core::domain::{Candle, Timeframe};

use crate::data_loader::{load_candles, LoadError};

/// Smallest and largest `limit` a fetch may ask for.
pub const MIN_CANDLE_LIMIT: usize = 4;
pub const MAX_CANDLE_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no candles for {symbol} {timeframe}")]
    NotFound { symbol: String, timeframe: Timeframe },

    #[error("candle limit {0} outside {MIN_CANDLE_LIMIT}..={MAX_CANDLE_LIMIT}")]
    InvalidLimit(usize),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("provider state poisoned")]
    Poisoned,
}

/// Source of candle series.
pub trait CandleProvider: Send + Sync {
    fn name(&self) -> &str;

    /// The newest `limit` candles, ascending, last one provisional.
    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError>;
}

fn check_limit(limit: usize) -> Result<(), ProviderError> {
    if (MIN_CANDLE_LIMIT..=MAX_CANDLE_LIMIT).contains(&limit) {
        Ok(())
    } else {
        Err(ProviderError::InvalidLimit(limit))
    }
}

fn tail(candles: &[Candle], limit: usize) -> Vec<Candle> {
    candles[candles.len().saturating_sub(limit)..].to_vec()
}

/// Reads `{symbol}_{timeframe}.csv` (or `.json`) from a directory on every
/// fetch, so an external process can keep the files current.
#[derive(Debug, Clone)]
pub struct FileProvider {
    root: PathBuf,
}

impl FileProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, symbol: &str, timeframe: Timeframe) -> Option<PathBuf> {
        ["csv", "json"]
            .iter()
            .map(|ext| self.root.join(format!("{symbol}_{timeframe}.{ext}")))
            .find(|p| p.is_file())
    }
}

impl CandleProvider for FileProvider {
    fn name(&self) -> &str {
        "file"
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        check_limit(limit)?;
        let path = self
            .path_for(symbol, timeframe)
            .ok_or_else(|| ProviderError::NotFound {
                symbol: symbol.to_string(),
                timeframe,
            })?;
        Ok(tail(&load_candles(&path)?, limit))
    }
}

/// Replays recorded series against a movable clock.
///
/// A fetch returns the candles that had *opened* by the clock; the newest of
/// them plays the provisional candle, exactly as a live feed would show it.
#[derive(Debug, Default)]
pub struct ReplayProvider {
    series: HashMap<(String, Timeframe), Vec<Candle>>,
    clock: RwLock<Option<DateTime<Utc>>>,
}

impl ReplayProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a recorded series (sorted ascending).
    pub fn with_series(mut self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        self.series.insert((symbol.to_string(), timeframe), candles);
        self
    }

    pub fn set_clock(&self, now: DateTime<Utc>) -> Result<(), ProviderError> {
        *self.clock.write().map_err(|_| ProviderError::Poisoned)? = Some(now);
        Ok(())
    }

    pub fn clock(&self) -> Option<DateTime<Utc>> {
        self.clock.read().ok().and_then(|c| *c)
    }

    /// Every distinct candle open time across all series, ascending. Useful
    /// as the step schedule of a replay.
    pub fn timeline(&self) -> Vec<DateTime<Utc>> {
        let mut times: Vec<DateTime<Utc>> = self
            .series
            .values()
            .flat_map(|s| s.iter().map(|c| c.timestamp))
            .collect();
        times.sort_unstable();
        times.dedup();
        times
    }
}

impl CandleProvider for ReplayProvider {
    fn name(&self) -> &str {
        "replay"
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, ProviderError> {
        check_limit(limit)?;
        let series = self
            .series
            .get(&(symbol.to_string(), timeframe))
            .ok_or_else(|| ProviderError::NotFound {
                symbol: symbol.to_string(),
                timeframe,
            })?;
        let visible = match self.clock() {
            Some(now) => &series[..series.partition_point(|c| c.timestamp <= now)],
            None => &series[..],
        };
        Ok(tail(visible, limit))
    }
}
