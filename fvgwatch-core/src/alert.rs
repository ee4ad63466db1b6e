//! Alert rules over indicator output.
//!
//! Rules are a closed set of shapes, validated once when they are built or
//! deserialised. [`check`] itself never fails: missing lines or too few
//! samples simply do not fire.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::series::SeriesOutput;

/// Tolerance for [`ValueCondition::Equals`].
pub const EQUALS_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueCondition {
    Above,
    Below,
    Equals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossDirection {
    CrossesAbove,
    CrossesBelow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertCondition {
    /// Current value against the threshold.
    Value(ValueCondition),
    /// Main line crossing the threshold between the last two samples.
    Crossover(CrossDirection),
    /// Main line crossing another named line of the same output.
    Compare {
        direction: CrossDirection,
        compare_with: String,
    },
}

impl fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertCondition::Value(ValueCondition::Above) => f.write_str("above"),
            AlertCondition::Value(ValueCondition::Below) => f.write_str("below"),
            AlertCondition::Value(ValueCondition::Equals) => f.write_str("equals"),
            AlertCondition::Crossover(CrossDirection::CrossesAbove) => f.write_str("crosses above"),
            AlertCondition::Crossover(CrossDirection::CrossesBelow) => f.write_str("crosses below"),
            AlertCondition::Compare {
                direction,
                compare_with,
            } => {
                let verb = match direction {
                    CrossDirection::CrossesAbove => "crosses above",
                    CrossDirection::CrossesBelow => "crosses below",
                };
                write!(f, "{verb} {compare_with}")
            }
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AlertConfigError {
    #[error("condition '{condition}' is not valid for {kind} alerts")]
    InvalidCondition { kind: AlertKind, condition: String },

    #[error("{0} alerts need a threshold")]
    MissingThreshold(AlertKind),

    #[error("threshold must be finite, got {0}")]
    NonFiniteThreshold(f64),

    #[error("compare alerts need 'compare_with'")]
    MissingCompareTarget,

    #[error("indicator_id must not be empty")]
    EmptyIndicatorId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Value,
    Crossover,
    Compare,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::Value => f.write_str("value"),
            AlertKind::Crossover => f.write_str("crossover"),
            AlertKind::Compare => f.write_str("compare"),
        }
    }
}

/// Loose, serialisable form of a rule, as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAlertRule {
    pub indicator_id: String,
    pub kind: AlertKind,
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_with: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// A validated alert rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAlertRule", into = "RawAlertRule")]
pub struct AlertRule {
    pub indicator_id: String,
    pub condition: AlertCondition,
    /// Unused by `Compare` rules.
    pub threshold: f64,
    /// Series the rule watches; `None` means the first (or only) one.
    pub line: Option<String>,
    pub enabled: bool,
}

impl AlertRule {
    pub fn new(indicator_id: impl Into<String>, condition: AlertCondition, threshold: f64) -> Self {
        Self {
            indicator_id: indicator_id.into(),
            condition,
            threshold,
            line: None,
            enabled: true,
        }
    }

    pub fn on_line(mut self, line: impl Into<String>) -> Self {
        self.line = Some(line.into());
        self
    }
}

impl TryFrom<RawAlertRule> for AlertRule {
    type Error = AlertConfigError;

    fn try_from(raw: RawAlertRule) -> Result<Self, Self::Error> {
        if raw.indicator_id.trim().is_empty() {
            return Err(AlertConfigError::EmptyIndicatorId);
        }
        let invalid = || AlertConfigError::InvalidCondition {
            kind: raw.kind,
            condition: raw.condition.clone(),
        };
        let cross = || match raw.condition.as_str() {
            "crosses_above" => Ok(CrossDirection::CrossesAbove),
            "crosses_below" => Ok(CrossDirection::CrossesBelow),
            _ => Err(invalid()),
        };

        let condition = match raw.kind {
            AlertKind::Value => AlertCondition::Value(match raw.condition.as_str() {
                "above" => ValueCondition::Above,
                "below" => ValueCondition::Below,
                "equals" => ValueCondition::Equals,
                _ => return Err(invalid()),
            }),
            AlertKind::Crossover => AlertCondition::Crossover(cross()?),
            AlertKind::Compare => AlertCondition::Compare {
                direction: cross()?,
                compare_with: raw
                    .compare_with
                    .clone()
                    .filter(|s| !s.is_empty())
                    .ok_or(AlertConfigError::MissingCompareTarget)?,
            },
        };

        let threshold = match (raw.kind, raw.threshold) {
            (AlertKind::Compare, t) => t.unwrap_or(0.0),
            (kind, None) => return Err(AlertConfigError::MissingThreshold(kind)),
            (_, Some(t)) => t,
        };
        if !threshold.is_finite() {
            return Err(AlertConfigError::NonFiniteThreshold(threshold));
        }

        Ok(AlertRule {
            indicator_id: raw.indicator_id,
            condition,
            threshold,
            line: raw.line,
            enabled: raw.enabled,
        })
    }
}

impl From<AlertRule> for RawAlertRule {
    fn from(rule: AlertRule) -> Self {
        let cross_name = |d: CrossDirection| match d {
            CrossDirection::CrossesAbove => "crosses_above",
            CrossDirection::CrossesBelow => "crosses_below",
        };
        let (kind, condition, compare_with) = match rule.condition {
            AlertCondition::Value(v) => (
                AlertKind::Value,
                match v {
                    ValueCondition::Above => "above",
                    ValueCondition::Below => "below",
                    ValueCondition::Equals => "equals",
                },
                None,
            ),
            AlertCondition::Crossover(d) => (AlertKind::Crossover, cross_name(d), None),
            AlertCondition::Compare {
                direction,
                compare_with,
            } => (AlertKind::Compare, cross_name(direction), Some(compare_with)),
        };
        RawAlertRule {
            indicator_id: rule.indicator_id,
            kind,
            condition: condition.to_string(),
            threshold: Some(rule.threshold),
            line: rule.line,
            compare_with,
            enabled: rule.enabled,
        }
    }
}

/// The numbers a check looked at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertDetails {
    Value {
        current: f64,
        threshold: f64,
    },
    Crossover {
        current: f64,
        previous: f64,
        threshold: f64,
    },
    Compare {
        main_current: f64,
        main_previous: f64,
        compare_current: f64,
        compare_previous: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertCheck {
    pub fired: bool,
    /// `None` when the output had too little data to evaluate.
    pub details: Option<AlertDetails>,
}

impl AlertCheck {
    fn quiet() -> Self {
        Self {
            fired: false,
            details: None,
        }
    }
}

/// Last and second-to-last samples.
fn tail(values: &[f64]) -> (Option<f64>, Option<f64>) {
    match values {
        [] => (None, None),
        [only] => (Some(*only), None),
        [.., prev, cur] => (Some(*cur), Some(*prev)),
    }
}

fn crossed(direction: CrossDirection, prev: f64, cur: f64, prev_ref: f64, cur_ref: f64) -> bool {
    match direction {
        CrossDirection::CrossesAbove => prev <= prev_ref && cur > cur_ref,
        CrossDirection::CrossesBelow => prev >= prev_ref && cur < cur_ref,
    }
}

/// Evaluate `rule` against the latest samples of `output`.
pub fn check(output: &SeriesOutput, rule: &AlertRule) -> AlertCheck {
    if !rule.enabled {
        return AlertCheck::quiet();
    }
    let Some(main) = output.line(rule.line.as_deref()) else {
        return AlertCheck::quiet();
    };
    let (current, previous) = tail(main);
    let Some(current) = current else {
        return AlertCheck::quiet();
    };
    let t = rule.threshold;

    match &rule.condition {
        AlertCondition::Value(cond) => AlertCheck {
            fired: match cond {
                ValueCondition::Above => current > t,
                ValueCondition::Below => current < t,
                ValueCondition::Equals => (current - t).abs() < EQUALS_TOLERANCE,
            },
            details: Some(AlertDetails::Value {
                current,
                threshold: t,
            }),
        },
        AlertCondition::Crossover(direction) => match previous {
            Some(previous) => AlertCheck {
                fired: crossed(*direction, previous, current, t, t),
                details: Some(AlertDetails::Crossover {
                    current,
                    previous,
                    threshold: t,
                }),
            },
            None => AlertCheck::quiet(),
        },
        AlertCondition::Compare {
            direction,
            compare_with,
        } => {
            let Some(other) = output.get(compare_with) else {
                return AlertCheck::quiet();
            };
            match (previous, tail(other)) {
                (Some(main_previous), (Some(compare_current), Some(compare_previous))) => AlertCheck {
                    fired: crossed(
                        *direction,
                        main_previous,
                        current,
                        compare_previous,
                        compare_current,
                    ),
                    details: Some(AlertDetails::Compare {
                        main_current: current,
                        main_previous,
                        compare_current,
                        compare_previous,
                    }),
                },
                _ => AlertCheck::quiet(),
            }
        }
    }
}
