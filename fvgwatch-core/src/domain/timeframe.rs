//! Candle timeframes as exchanges name them ("1m", "15m", "4h", "1M", ...).

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeframeError {
    #[error("unknown timeframe '{0}' (expected one of 1m 3m 5m 15m 30m 1h 2h 4h 6h 8h 12h 1d 3d 1w 1M)")]
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H8,
    H12,
    D1,
    D3,
    W1,
    Mo1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 15] = [
        Timeframe::M1,
        Timeframe::M3,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H2,
        Timeframe::H4,
        Timeframe::H6,
        Timeframe::H8,
        Timeframe::H12,
        Timeframe::D1,
        Timeframe::D3,
        Timeframe::W1,
        Timeframe::Mo1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H6 => "6h",
            Timeframe::H8 => "8h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
            Timeframe::D3 => "3d",
            Timeframe::W1 => "1w",
            Timeframe::Mo1 => "1M",
        }
    }

    /// Nominal length in seconds. A month is counted as 30 days.
    pub fn seconds(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M3 => 180,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1_800,
            Timeframe::H1 => 3_600,
            Timeframe::H2 => 7_200,
            Timeframe::H4 => 14_400,
            Timeframe::H6 => 21_600,
            Timeframe::H8 => 28_800,
            Timeframe::H12 => 43_200,
            Timeframe::D1 => 86_400,
            Timeframe::D3 => 259_200,
            Timeframe::W1 => 604_800,
            Timeframe::Mo1 => 2_592_000,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1 Minute",
            Timeframe::M3 => "3 Minutes",
            Timeframe::M5 => "5 Minutes",
            Timeframe::M15 => "15 Minutes",
            Timeframe::M30 => "30 Minutes",
            Timeframe::H1 => "1 Hour",
            Timeframe::H2 => "2 Hours",
            Timeframe::H4 => "4 Hours",
            Timeframe::H6 => "6 Hours",
            Timeframe::H8 => "8 Hours",
            Timeframe::H12 => "12 Hours",
            Timeframe::D1 => "1 Day",
            Timeframe::D3 => "3 Days",
            Timeframe::W1 => "1 Week",
            Timeframe::Mo1 => "1 Month",
        }
    }

    /// Epoch-aligned close time of the candle that is open at `now`.
    pub fn next_close_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let secs = self.seconds();
        let next = (now.timestamp().div_euclid(secs) + 1) * secs;
        Utc.timestamp_opt(next, 0).single()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // "1M" (month) is the only case-sensitive name.
        if trimmed == "1M" {
            return Ok(Timeframe::Mo1);
        }
        let lower = trimmed.to_ascii_lowercase();
        Timeframe::ALL
            .iter()
            .copied()
            .find(|tf| *tf != Timeframe::Mo1 && tf.as_str() == lower)
            .ok_or_else(|| TimeframeError::Unknown(s.to_string()))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TimeframeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip_all() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.as_str().parse::<Timeframe>().unwrap(), tf);
        }
    }

    #[test]
    fn month_is_case_sensitive() {
        assert_eq!("1M".parse::<Timeframe>().unwrap(), Timeframe::Mo1);
        assert_eq!("1m".parse::<Timeframe>().unwrap(), Timeframe::M1);
        assert_eq!("4H".parse::<Timeframe>().unwrap(), Timeframe::H4);
    }

    #[test]
    fn unknown_timeframe_is_rejected() {
        assert_eq!(
            "7m".parse::<Timeframe>(),
            Err(TimeframeError::Unknown("7m".into()))
        );
    }

    #[test]
    fn next_close_is_aligned() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 7, 30).unwrap();
        let next = Timeframe::M15.next_close_after(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap());
    }

    #[test]
    fn serde_uses_exchange_names() {
        let json = serde_json::to_string(&Timeframe::H4).unwrap();
        assert_eq!(json, "\"4h\"");
        let back: Timeframe = serde_json::from_str("\"15m\"").unwrap();
        assert_eq!(back, Timeframe::M15);
        assert!(serde_json::from_str::<Timeframe>("\"2w\"").is_err());
    }
}
