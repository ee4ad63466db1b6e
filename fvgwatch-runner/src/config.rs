//! Monitor configuration loaded from TOML.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fvgwatch_core::alert::AlertRule;
use fvgwatch_core::domain::{PriceLevel, Timeframe};
use fvgwatch_core::engine::{EngineConfig, StalenessPolicy};
use fvgwatch_core::indicators::{BuiltinKind, IndicatorDescriptor, Params};
use fvgwatch_core::sandbox::{Sandbox, SandboxLimits};

use crate::provider::{MAX_CANDLE_LIMIT, MIN_CANDLE_LIMIT};
use crate::store::MAX_LEVELS;

pub const MIN_REFRESH_SECS: u64 = 5;
pub const MAX_REFRESH_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("refresh_secs must be within {MIN_REFRESH_SECS}..={MAX_REFRESH_SECS}, got {0}")]
    RefreshInterval(u64),

    #[error("candle_limit must be within {MIN_CANDLE_LIMIT}..={MAX_CANDLE_LIMIT}, got {0}")]
    CandleLimit(usize),

    #[error("symbol must not be empty")]
    EmptySymbol,

    #[error("level {id}: price must be finite and positive, got {price}")]
    LevelPrice { id: u64, price: f64 },

    #[error("level id {0} is used more than once")]
    DuplicateLevel(u64),

    #[error("{0} levels configured, at most {MAX_LEVELS} allowed")]
    TooManyLevels(usize),

    #[error("min_gap_size must be finite and non-negative, got {0}")]
    MinGapSize(f64),

    #[error("staleness: {0}")]
    Staleness(String),

    #[error("indicator '{0}': give exactly one of a built-in id, `code` or `script`")]
    IndicatorSource(String),

    #[error("indicator '{0}' is defined more than once")]
    DuplicateIndicator(String),

    #[error("indicator '{id}': {message}")]
    Indicator { id: String, message: String },

    #[error("alert on '{0}' refers to an unknown indicator")]
    UnknownIndicator(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSection {
    pub symbol: String,
    #[serde(default = "default_trigger")]
    pub trigger_timeframe: Timeframe,
    #[serde(default = "default_confirm")]
    pub confirm_timeframe: Timeframe,
    #[serde(default = "default_refresh")]
    pub refresh_secs: u64,
    #[serde(default = "default_limit")]
    pub candle_limit: usize,
    /// Shown as the user in webhook payloads.
    #[serde(default)]
    pub username: Option<String>,
}

fn default_trigger() -> Timeframe {
    Timeframe::M15
}
fn default_confirm() -> Timeframe {
    Timeframe::M5
}
fn default_refresh() -> u64 {
    MIN_REFRESH_SECS
}
fn default_limit() -> usize {
    200
}

/// Fewest candles `after_candles` may name: a gap forms on the third candle
/// after the tap at the earliest.
pub const MIN_STALENESS_CANDLES: usize = 3;

/// Tagged form of [`StalenessPolicy`] for TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum StalenessConfig {
    #[default]
    Never,
    AfterCandles {
        candles: usize,
    },
    AfterSecs {
        secs: i64,
    },
}

impl StalenessConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            StalenessConfig::Never => Ok(()),
            StalenessConfig::AfterCandles { candles } if candles < MIN_STALENESS_CANDLES => {
                Err(ConfigError::Staleness(format!(
                    "after_candles needs at least {MIN_STALENESS_CANDLES} candles, got {candles}"
                )))
            }
            StalenessConfig::AfterCandles { .. } => Ok(()),
            StalenessConfig::AfterSecs { secs } => {
                if secs > 0 && chrono::Duration::try_seconds(secs).is_some() {
                    Ok(())
                } else {
                    Err(ConfigError::Staleness(format!(
                        "after_secs must be a positive number of seconds in range, got {secs}"
                    )))
                }
            }
        }
    }
}

impl From<StalenessConfig> for StalenessPolicy {
    fn from(c: StalenessConfig) -> Self {
        match c {
            StalenessConfig::Never => StalenessPolicy::Never,
            StalenessConfig::AfterCandles { candles } => StalenessPolicy::AfterCandles(candles),
            StalenessConfig::AfterSecs { secs } => StalenessPolicy::AfterDuration(
                chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default)]
    pub min_gap_size: f64,
    #[serde(default)]
    pub staleness: StalenessConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxSection {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
}

fn default_timeout_ms() -> u64 {
    SandboxLimits::default().timeout.as_millis() as u64
}
fn default_max_steps() -> u64 {
    SandboxLimits::default().max_steps
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_steps: default_max_steps(),
        }
    }
}

/// One `[[indicators]]` entry: a built-in referenced by id, inline `code`, or
/// a `script` file path (relative to the config file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub script: Option<PathBuf>,
    #[serde(default)]
    pub params: Params,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub monitor: MonitorSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub sandbox: SandboxSection,
    #[serde(default)]
    pub levels: Vec<PriceLevel>,
    #[serde(default)]
    pub indicators: Vec<IndicatorEntry>,
    #[serde(default)]
    pub alerts: Vec<AlertRule>,
    /// Directory relative script paths resolve against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl MonitorConfig {
    /// Load, parse and validate a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::parse(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a TOML string. Script paths resolve against the
    /// working directory.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config = Self::parse(content)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reject configurations the engine would otherwise have to skip silently.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.monitor;
        if m.symbol.trim().is_empty() {
            return Err(ConfigError::EmptySymbol);
        }
        if !(MIN_REFRESH_SECS..=MAX_REFRESH_SECS).contains(&m.refresh_secs) {
            return Err(ConfigError::RefreshInterval(m.refresh_secs));
        }
        if !(MIN_CANDLE_LIMIT..=MAX_CANDLE_LIMIT).contains(&m.candle_limit) {
            return Err(ConfigError::CandleLimit(m.candle_limit));
        }
        let gap = self.engine.min_gap_size;
        if !gap.is_finite() || gap < 0.0 {
            return Err(ConfigError::MinGapSize(gap));
        }
        self.engine.staleness.validate()?;

        if self.levels.len() > MAX_LEVELS {
            return Err(ConfigError::TooManyLevels(self.levels.len()));
        }
        let mut ids = HashSet::new();
        for level in &self.levels {
            if !level.has_valid_price() {
                return Err(ConfigError::LevelPrice {
                    id: level.id.0,
                    price: level.price,
                });
            }
            if !ids.insert(level.id) {
                return Err(ConfigError::DuplicateLevel(level.id.0));
            }
        }

        let mut indicator_ids = HashSet::new();
        for entry in &self.indicators {
            let sources = [
                entry.code.is_some(),
                entry.script.is_some(),
                entry.id.parse::<BuiltinKind>().is_ok() && entry.code.is_none() && entry.script.is_none(),
            ];
            if sources.iter().filter(|s| **s).count() != 1 {
                return Err(ConfigError::IndicatorSource(entry.id.clone()));
            }
            if !indicator_ids.insert(entry.id.as_str()) {
                return Err(ConfigError::DuplicateIndicator(entry.id.clone()));
            }
            if let Some(code) = &entry.code {
                Sandbox::default()
                    .check(code)
                    .map_err(|e| ConfigError::Indicator {
                        id: entry.id.clone(),
                        message: e.to_string(),
                    })?;
            }
        }
        for alert in &self.alerts {
            if !indicator_ids.contains(alert.indicator_id.as_str()) {
                return Err(ConfigError::UnknownIndicator(alert.indicator_id.clone()));
            }
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            min_gap_size: self.engine.min_gap_size,
            staleness: self.engine.staleness.into(),
        }
    }

    pub fn sandbox_limits(&self) -> SandboxLimits {
        SandboxLimits {
            timeout: Duration::from_millis(self.sandbox.timeout_ms),
            max_steps: self.sandbox.max_steps,
            ..SandboxLimits::default()
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.refresh_secs)
    }

    /// Resolve every `[[indicators]]` entry into a runnable descriptor.
    /// Scripts are read from disk and syntax-checked here.
    pub fn descriptors(&self) -> Result<Vec<IndicatorDescriptor>, ConfigError> {
        let sandbox = Sandbox::new(self.sandbox_limits());
        self.indicators
            .iter()
            .map(|entry| {
                let code = match (&entry.code, &entry.script) {
                    (Some(code), _) => Some(code.clone()),
                    (None, Some(path)) => {
                        let full = self.base_dir.join(path);
                        Some(std::fs::read_to_string(&full).map_err(|e| ConfigError::Indicator {
                            id: entry.id.clone(),
                            message: format!("cannot read {}: {e}", full.display()),
                        })?)
                    }
                    (None, None) => None,
                };

                let mut descriptor = match code {
                    Some(code) => {
                        sandbox.check(&code).map_err(|e| ConfigError::Indicator {
                            id: entry.id.clone(),
                            message: e.to_string(),
                        })?;
                        IndicatorDescriptor::script(entry.id.clone(), code, Params::new())
                    }
                    None => {
                        let kind = entry
                            .id
                            .parse::<BuiltinKind>()
                            .map_err(|_| ConfigError::IndicatorSource(entry.id.clone()))?;
                        IndicatorDescriptor::builtin(kind)
                    }
                };
                descriptor.params.extend(entry.params.clone());
                if let Some(name) = &entry.name {
                    descriptor.name = name.clone();
                }
                Ok(descriptor)
            })
            .collect()
    }
}
