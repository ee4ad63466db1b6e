//! Notifications: what the monitor reports and where it goes.
//!
//! Delivery is fire-and-forget from the engine's point of view: a failed
//! send is logged by the monitor and never rolls back a signal.

use std::io::Write;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

use fvgwatch_core::alert::AlertDetails;
use fvgwatch_core::domain::{FvgDirection, Signal, Timeframe};

/// Embed colour for bullish signals.
pub const BULLISH_COLOR: u32 = 3_066_993;
/// Embed colour for bearish signals.
pub const BEARISH_COLOR: u32 = 15_158_332;
/// Embed colour for indicator alerts.
pub const ALERT_COLOR: u32 = 3_447_003;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot encode notification: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("notifier lock poisoned")]
    Poisoned,
}

/// An alert rule that fired on the latest completed candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub indicator_id: String,
    pub indicator_name: String,
    /// Human-readable condition, e.g. "crosses above".
    pub condition: String,
    pub details: AlertDetails,
    pub candle_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Signal(Signal),
    Alert(AlertEvent),
}

impl Notification {
    pub fn symbol(&self) -> &str {
        match self {
            Notification::Signal(s) => &s.symbol,
            Notification::Alert(a) => &a.symbol,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Logs each notification through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        match notification {
            Notification::Signal(s) => info!(
                symbol = %s.symbol,
                level = s.level_price,
                direction = %s.fvg_direction,
                zone_low = s.gap_low,
                zone_high = s.gap_high,
                "FVG signal"
            ),
            Notification::Alert(a) => info!(
                symbol = %a.symbol,
                indicator = %a.indicator_id,
                condition = %a.condition,
                "indicator alert"
            ),
        }
        Ok(())
    }
}

/// Writes one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesNotifier<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesNotifier<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> Result<W, NotifyError> {
        self.out.into_inner().map_err(|_| NotifyError::Poisoned)
    }
}

impl<W: Write + Send> Notifier for JsonLinesNotifier<W> {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let line = serde_json::to_string(notification)?;
        let mut out = self.out.lock().map_err(|_| NotifyError::Poisoned)?;
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }
}

/// Keeps everything it is sent.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.sent()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Signal(s) => Some(s),
                Notification::Alert(_) => None,
            })
            .collect()
    }

    pub fn alerts(&self) -> Vec<AlertEvent> {
        self.sent()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Alert(a) => Some(a),
                Notification::Signal(_) => None,
            })
            .collect()
    }
}

impl Notifier for CollectingNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Poisoned)?
            .push(notification.clone());
        Ok(())
    }
}

// ─── Webhook formatting ──────────────────────────────────────────────

fn field(name: &str, value: String, inline: bool) -> Value {
    json!({ "name": name, "value": value, "inline": inline })
}

fn suggestion(signal: &Signal) -> String {
    match signal.fvg_direction {
        FvgDirection::Bullish => format!(
            "**Bullish FVG detected!**\n• Consider LONG positions\n• Entry: Near ${:.2}\n• Target: ${:.2}+\n• Watch for price action in FVG zone",
            signal.gap_low, signal.gap_high
        ),
        FvgDirection::Bearish => format!(
            "**Bearish FVG detected!**\n• Consider SHORT positions\n• Entry: Near ${:.2}\n• Target: ${:.2}-\n• Watch for price action in FVG zone",
            signal.gap_high, signal.gap_low
        ),
    }
}

fn signal_embed(s: &Signal, username: &str) -> Value {
    let color = match s.fvg_direction {
        FvgDirection::Bullish => BULLISH_COLOR,
        FvgDirection::Bearish => BEARISH_COLOR,
    };
    json!({
        "title": "FVG Signal Detected",
        "description": format!("Fair Value Gap signal triggered for **{}**", s.symbol),
        "color": color,
        "fields": [
            field("Symbol", s.symbol.clone(), true),
            field("Price Timeframe", s.trigger_timeframe.to_string(), true),
            field("FVG Timeframe", s.confirm_timeframe.to_string(), true),
            field("Price Level", format!("${:.2}", s.level_price), true),
            field("FVG Type", s.fvg_direction.to_string(), true),
            field("Expected", s.expected_direction.to_string(), true),
            field("Trigger Price", format!("${:.2}", s.trigger_price), true),
            field("User", username.to_string(), true),
            field(
                "FVG Zone",
                format!("Low: ${:.2}\nHigh: ${:.2}", s.gap_low, s.gap_high),
                false,
            ),
            field(
                "How Signal Triggered",
                format!(
                    "Price tapped **${:.2}** on **{}** chart, then FVG formed on **{}** chart",
                    s.level_price, s.trigger_timeframe, s.confirm_timeframe
                ),
                false,
            ),
            field("Trading Suggestion", suggestion(s), false),
        ],
        "timestamp": s.fvg_timestamp.to_rfc3339(),
        "footer": { "text": "fvgwatch" },
    })
}

fn details_text(details: &AlertDetails) -> String {
    match details {
        AlertDetails::Value { current, threshold } => {
            format!("Current: {current:.4}\nThreshold: {threshold:.4}")
        }
        AlertDetails::Crossover {
            current,
            previous,
            threshold,
        } => format!("Previous: {previous:.4}\nCurrent: {current:.4}\nThreshold: {threshold:.4}"),
        AlertDetails::Compare {
            main_current,
            main_previous,
            compare_current,
            compare_previous,
        } => format!(
            "Line: {main_previous:.4} → {main_current:.4}\nCompared: {compare_previous:.4} → {compare_current:.4}"
        ),
    }
}

fn alert_embed(a: &AlertEvent, username: &str) -> Value {
    json!({
        "title": "Indicator Alert",
        "description": format!("**{}** {} on **{}**", a.indicator_name, a.condition, a.symbol),
        "color": ALERT_COLOR,
        "fields": [
            field("Symbol", a.symbol.clone(), true),
            field("Timeframe", a.timeframe.to_string(), true),
            field("Indicator", a.indicator_name.clone(), true),
            field("Condition", a.condition.clone(), true),
            field("User", username.to_string(), true),
            field("Values", details_text(&a.details), false),
        ],
        "timestamp": a.candle_timestamp.to_rfc3339(),
        "footer": { "text": "fvgwatch" },
    })
}

/// The JSON body a Discord-style webhook would receive for `notification`.
pub fn discord_payload(notification: &Notification, username: &str) -> Value {
    let embed = match notification {
        Notification::Signal(s) => signal_embed(s, username),
        Notification::Alert(a) => alert_embed(a, username),
    };
    json!({
        "embeds": [embed],
        "username": "FVG Trading Bot",
    })
}
