//! Indicator descriptors: the built-in catalogue and user scripts behind one
//! calling convention.
//!
//! Callers hold an [`IndicatorDescriptor`] and call [`IndicatorDescriptor::run`];
//! whether the work happens in native code or in the script sandbox is not
//! visible in the result.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Adx, Atr, Bollinger, Ema, Indicator, Macd, Obv, Rsi, Sma, Stochastic, Vwap};
use crate::domain::Candle;
use crate::sandbox::{ExecutionError, Sandbox};
use crate::series::SeriesOutput;

/// Named numeric parameters, passed to `calculate` by name.
pub type Params = BTreeMap<String, f64>;

/// The built-in catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinKind {
    Sma,
    Ema,
    Rsi,
    Macd,
    #[serde(rename = "bb")]
    Bollinger,
    Atr,
    #[serde(rename = "stoch")]
    Stochastic,
    Adx,
    Vwap,
    Obv,
}

impl BuiltinKind {
    pub const ALL: [BuiltinKind; 10] = [
        BuiltinKind::Sma,
        BuiltinKind::Ema,
        BuiltinKind::Rsi,
        BuiltinKind::Macd,
        BuiltinKind::Bollinger,
        BuiltinKind::Atr,
        BuiltinKind::Stochastic,
        BuiltinKind::Adx,
        BuiltinKind::Vwap,
        BuiltinKind::Obv,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            BuiltinKind::Sma => "sma",
            BuiltinKind::Ema => "ema",
            BuiltinKind::Rsi => "rsi",
            BuiltinKind::Macd => "macd",
            BuiltinKind::Bollinger => "bb",
            BuiltinKind::Atr => "atr",
            BuiltinKind::Stochastic => "stoch",
            BuiltinKind::Adx => "adx",
            BuiltinKind::Vwap => "vwap",
            BuiltinKind::Obv => "obv",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BuiltinKind::Sma => "Simple Moving Average",
            BuiltinKind::Ema => "Exponential Moving Average",
            BuiltinKind::Rsi => "Relative Strength Index",
            BuiltinKind::Macd => "MACD",
            BuiltinKind::Bollinger => "Bollinger Bands",
            BuiltinKind::Atr => "Average True Range",
            BuiltinKind::Stochastic => "Stochastic Oscillator",
            BuiltinKind::Adx => "Average Directional Index",
            BuiltinKind::Vwap => "Volume Weighted Average Price",
            BuiltinKind::Obv => "On Balance Volume",
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            BuiltinKind::Sma | BuiltinKind::Ema | BuiltinKind::Adx => "Trend",
            BuiltinKind::Rsi | BuiltinKind::Macd | BuiltinKind::Stochastic => "Momentum",
            BuiltinKind::Bollinger | BuiltinKind::Atr => "Volatility",
            BuiltinKind::Vwap | BuiltinKind::Obv => "Volume",
        }
    }

    pub fn default_params(&self) -> Params {
        let pairs: &[(&str, f64)] = match self {
            BuiltinKind::Sma | BuiltinKind::Ema => &[("period", 20.0)],
            BuiltinKind::Rsi | BuiltinKind::Atr | BuiltinKind::Adx => &[("period", 14.0)],
            BuiltinKind::Macd => &[("fast", 12.0), ("slow", 26.0), ("signal", 9.0)],
            BuiltinKind::Bollinger => &[("period", 20.0), ("std", 2.0)],
            BuiltinKind::Stochastic => &[("k_period", 14.0), ("d_period", 3.0)],
            BuiltinKind::Vwap | BuiltinKind::Obv => &[],
        };
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    /// Build the native indicator for a fully merged parameter set.
    pub fn build(&self, params: &Params) -> Result<Box<dyn Indicator>, ExecutionError> {
        let defaults = self.default_params();
        let period = |name: &str| period_param(params, &defaults, name);
        Ok(match self {
            BuiltinKind::Sma => Box::new(Sma::new(period("period")?)),
            BuiltinKind::Ema => Box::new(Ema::new(period("period")?)),
            BuiltinKind::Rsi => Box::new(Rsi::new(period("period")?)),
            BuiltinKind::Macd => Box::new(Macd::new(
                period("fast")?,
                period("slow")?,
                period("signal")?,
            )),
            BuiltinKind::Bollinger => Box::new(Bollinger::new(
                period("period")?,
                param(params, &defaults, "std"),
            )),
            BuiltinKind::Atr => Box::new(Atr::new(period("period")?)),
            BuiltinKind::Stochastic => {
                Box::new(Stochastic::new(period("k_period")?, period("d_period")?))
            }
            BuiltinKind::Adx => Box::new(Adx::new(period("period")?)),
            BuiltinKind::Vwap => Box::new(Vwap::new()),
            BuiltinKind::Obv => Box::new(Obv::new()),
        })
    }
}

impl fmt::Display for BuiltinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for BuiltinKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        BuiltinKind::ALL
            .iter()
            .copied()
            .find(|k| k.id() == lower)
            .ok_or_else(|| format!("unknown built-in indicator '{s}'"))
    }
}

/// Extract a named parameter, falling back to the catalogue default.
fn param(params: &Params, defaults: &Params, name: &str) -> f64 {
    params
        .get(name)
        .or_else(|| defaults.get(name))
        .copied()
        .unwrap_or(f64::NAN)
}

/// Extract a window length: a whole number of at least 1.
fn period_param(params: &Params, defaults: &Params, name: &str) -> Result<usize, ExecutionError> {
    let value = param(params, defaults, name);
    if value.is_finite() && value >= 1.0 && value.fract() == 0.0 {
        Ok(value as usize)
    } else {
        Err(ExecutionError::Runtime(format!(
            "parameter '{name}' must be a positive whole number, got {value}"
        )))
    }
}

/// Where an indicator's implementation lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum IndicatorSource {
    Builtin(BuiltinKind),
    Script(String),
}

/// A runnable indicator: identity, display metadata, source and defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub source: IndicatorSource,
    #[serde(default)]
    pub params: Params,
}

impl IndicatorDescriptor {
    pub fn builtin(kind: BuiltinKind) -> Self {
        Self {
            id: kind.id().to_string(),
            name: kind.display_name().to_string(),
            category: kind.category().to_string(),
            source: IndicatorSource::Builtin(kind),
            params: kind.default_params(),
        }
    }

    pub fn script(id: impl Into<String>, code: impl Into<String>, params: Params) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            category: "Custom".to_string(),
            source: IndicatorSource::Script(code.into()),
            params,
        }
    }

    /// Descriptor defaults overlaid with `overrides`.
    pub fn merged_params(&self, overrides: &Params) -> Params {
        let mut merged = self.params.clone();
        merged.extend(overrides.iter().map(|(k, v)| (k.clone(), *v)));
        merged
    }

    /// Compute the indicator over `candles`.
    pub fn run(
        &self,
        candles: &[Candle],
        overrides: &Params,
        sandbox: &Sandbox,
    ) -> Result<SeriesOutput, ExecutionError> {
        let params = self.merged_params(overrides);
        match &self.source {
            IndicatorSource::Builtin(kind) => Ok(kind.build(&params)?.compute(candles)),
            IndicatorSource::Script(code) => sandbox.run(code, candles, &params),
        }
    }
}

/// The built-in catalogue, in display order.
pub fn builtin_library() -> Vec<IndicatorDescriptor> {
    BuiltinKind::ALL
        .iter()
        .map(|k| IndicatorDescriptor::builtin(*k))
        .collect()
}
