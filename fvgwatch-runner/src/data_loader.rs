//! Candle loading from CSV and JSON files.
//!
//! CSV files need a header with `timestamp,open,high,low,close,volume`.
//! Timestamps may be RFC 3339 strings or epoch milliseconds (the usual
//! exchange kline format). JSON files hold an array of candle objects in the
//! same shape. Loaded series are sorted ascending and de-duplicated by
//! timestamp; the last row of a file is treated like any fetched series, as
//! the provisional candle.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use fvgwatch_core::domain::Candle;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bad CSV in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("bad JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("row {row}: invalid timestamp '{value}'")]
    Timestamp { row: usize, value: String },

    #[error("unsupported candle file extension: {0} (expected .csv or .json)")]
    UnsupportedFormat(String),
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Parse RFC 3339 or integer epoch milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(millis) = raw.parse::<i64>() {
        return Utc.timestamp_millis_opt(millis).single();
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Load a candle file, picking the format from its extension.
pub fn load_candles(path: &Path) -> Result<Vec<Candle>, LoadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let origin = path.display().to_string();
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: origin.clone(),
        source,
    })?;
    let reader = BufReader::new(file);

    let candles = match ext.as_str() {
        "csv" => read_csv(reader, &origin)?,
        "json" => serde_json::from_reader(reader).map_err(|source| LoadError::Json {
            path: origin.clone(),
            source,
        })?,
        other => return Err(LoadError::UnsupportedFormat(other.to_string())),
    };

    let candles = normalize(candles);
    debug!(path = %origin, count = candles.len(), "loaded candles");
    Ok(candles)
}

/// Read CSV rows from any reader. `origin` is only used in error messages.
pub fn read_csv<R: Read>(reader: R, origin: &str) -> Result<Vec<Candle>, LoadError> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut candles = Vec::new();
    for (i, result) in csv_reader.deserialize().enumerate() {
        let row: CsvRow = result.map_err(|source| LoadError::Csv {
            path: origin.to_string(),
            source,
        })?;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| LoadError::Timestamp {
            row: i + 1,
            value: row.timestamp.clone(),
        })?;
        candles.push(Candle::new(
            timestamp, row.open, row.high, row.low, row.close, row.volume,
        ));
    }
    Ok(candles)
}

/// Sort ascending, keep the last row for a repeated timestamp, and warn about
/// candles whose OHLC values are inconsistent.
pub fn normalize(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.sort_by_key(|c| c.timestamp);
    let mut out: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles {
        match out.last_mut() {
            Some(prev) if prev.timestamp == candle.timestamp => *prev = candle,
            _ => out.push(candle),
        }
    }
    let insane = out.iter().filter(|c| !c.is_sane()).count();
    if insane > 0 {
        warn!(count = insane, "candles with inconsistent OHLC values");
    }
    out
}
