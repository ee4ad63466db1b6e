//! The monitoring loop: fetch, evaluate, alert, notify.
//!
//! One [`Monitor`] watches one symbol and owns that symbol's tap state.
//! Monitors share nothing, so [`tick_all`] can run them on rayon's pool
//! without locks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use fvgwatch_core::alert::{check, AlertRule};
use fvgwatch_core::domain::{completed, Candle, Signal, Timeframe};
use fvgwatch_core::engine::SignalEngine;
use fvgwatch_core::indicators::{IndicatorDescriptor, Params};
use fvgwatch_core::sandbox::{ExecutionError, Sandbox};
use fvgwatch_core::series::SeriesOutput;

use crate::config::{ConfigError, MonitorConfig};
use crate::notify::{AlertEvent, Notification, Notifier};
use crate::provider::{CandleProvider, ProviderError};
use crate::store::{LevelStore, StoreError};

/// Granularity of the stop-flag check while sleeping between ticks.
const STOP_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("level store error: {0}")]
    Store(#[from] StoreError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// An indicator that failed this tick. Other indicators still ran.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorFailure {
    pub indicator_id: String,
    pub error: ExecutionError,
}

/// What one tick produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub signals: Vec<Signal>,
    pub alerts: Vec<AlertEvent>,
    pub indicator_failures: Vec<IndicatorFailure>,
    /// Notifications the notifier rejected.
    pub undelivered: usize,
}

pub struct Monitor {
    symbol: String,
    trigger_timeframe: Timeframe,
    confirm_timeframe: Timeframe,
    candle_limit: usize,
    refresh: Duration,
    engine: SignalEngine,
    sandbox: Sandbox,
    indicators: Vec<IndicatorDescriptor>,
    alerts: Vec<AlertRule>,
    /// Rule index → completed candle the rule last fired on.
    last_fired: HashMap<usize, DateTime<Utc>>,
}

impl Monitor {
    pub fn from_config(config: &MonitorConfig) -> Result<Self, MonitorError> {
        let m = &config.monitor;
        Ok(Self {
            symbol: m.symbol.clone(),
            trigger_timeframe: m.trigger_timeframe,
            confirm_timeframe: m.confirm_timeframe,
            candle_limit: m.candle_limit,
            refresh: config.refresh_interval(),
            engine: SignalEngine::new(config.engine_config()),
            sandbox: Sandbox::new(config.sandbox_limits()),
            indicators: config.descriptors()?,
            alerts: config.alerts.clone(),
            last_fired: HashMap::new(),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn engine(&self) -> &SignalEngine {
        &self.engine
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh
    }

    /// One synchronous pass.
    ///
    /// Provider and store read failures abort the tick (tap state is left
    /// untouched). Indicator failures and notifier failures do not.
    pub fn tick(
        &mut self,
        provider: &dyn CandleProvider,
        store: &dyn LevelStore,
        notifier: &dyn Notifier,
    ) -> Result<TickReport, MonitorError> {
        let trigger = provider.fetch(&self.symbol, self.trigger_timeframe, self.candle_limit)?;
        let confirm = provider.fetch(&self.symbol, self.confirm_timeframe, self.candle_limit)?;
        let mut levels = store.load_levels(&self.symbol)?;

        let mut report = TickReport {
            signals: self.engine.evaluate(
                &trigger,
                &confirm,
                &mut levels,
                &self.symbol,
                self.trigger_timeframe,
                self.confirm_timeframe,
            ),
            ..TickReport::default()
        };

        for signal in &report.signals {
            if let Err(e) = store.mark_triggered(&self.symbol, signal.level_id) {
                warn!(symbol = %self.symbol, level = %signal.level_id, error = %e, "could not persist triggered level");
            }
        }

        let (alerts, failures) = self.check_alerts(&trigger);
        report.alerts = alerts;
        report.indicator_failures = failures;

        let outgoing = report
            .signals
            .iter()
            .cloned()
            .map(Notification::Signal)
            .chain(report.alerts.iter().cloned().map(Notification::Alert));
        for notification in outgoing {
            if let Err(e) = notifier.send(&notification) {
                warn!(symbol = %self.symbol, error = %e, "notification not delivered");
                report.undelivered += 1;
            }
        }

        debug!(
            symbol = %self.symbol,
            signals = report.signals.len(),
            alerts = report.alerts.len(),
            pending_taps = self.engine.pending_taps().count(),
            "tick complete"
        );
        Ok(report)
    }

    /// Run each indicator referenced by an enabled rule once, over the
    /// completed trigger candles, then check the rules. A rule fires at most
    /// once per completed candle.
    fn check_alerts(&mut self, trigger: &[Candle]) -> (Vec<AlertEvent>, Vec<IndicatorFailure>) {
        let mut events = Vec::new();
        let mut failures = Vec::new();
        let closed = completed(trigger);
        let Some(latest) = closed.last().map(|c| c.timestamp) else {
            return (events, failures);
        };

        let mut outputs: HashMap<&str, Option<SeriesOutput>> = HashMap::new();
        for (index, rule) in self.alerts.iter().enumerate() {
            if !rule.enabled {
                continue;
            }
            let Some(descriptor) = self.indicators.iter().find(|d| d.id == rule.indicator_id) else {
                continue;
            };
            let output = outputs.entry(descriptor.id.as_str()).or_insert_with(|| {
                match descriptor.run(closed, &Params::new(), &self.sandbox) {
                    Ok(out) => Some(out),
                    Err(error) => {
                        warn!(symbol = %self.symbol, indicator = %descriptor.id, %error, "indicator failed");
                        failures.push(IndicatorFailure {
                            indicator_id: descriptor.id.clone(),
                            error,
                        });
                        None
                    }
                }
            });
            let Some(output) = output else {
                continue;
            };

            let result = check(output, rule);
            if !result.fired || self.last_fired.get(&index) == Some(&latest) {
                continue;
            }
            let Some(details) = result.details else {
                continue;
            };
            self.last_fired.insert(index, latest);
            info!(
                symbol = %self.symbol,
                indicator = %descriptor.id,
                condition = %rule.condition,
                "alert fired"
            );
            events.push(AlertEvent {
                symbol: self.symbol.clone(),
                timeframe: self.trigger_timeframe,
                indicator_id: descriptor.id.clone(),
                indicator_name: descriptor.name.clone(),
                condition: rule.condition.to_string(),
                details,
                candle_timestamp: latest,
            });
        }
        (events, failures)
    }

    /// Tick every refresh interval until `stop` is set. Failed ticks are
    /// logged and retried on the next interval. Returns the number of ticks.
    pub fn run(
        &mut self,
        provider: &dyn CandleProvider,
        store: &dyn LevelStore,
        notifier: &dyn Notifier,
        stop: &AtomicBool,
    ) -> usize {
        info!(
            symbol = %self.symbol,
            trigger = %self.trigger_timeframe,
            confirm = %self.confirm_timeframe,
            every_secs = self.refresh.as_secs(),
            "monitoring started"
        );
        let mut ticks = 0;
        while !stop.load(Ordering::Relaxed) {
            let started = Instant::now();
            if let Err(e) = self.tick(provider, store, notifier) {
                warn!(symbol = %self.symbol, error = %e, "tick failed");
            }
            ticks += 1;

            while !stop.load(Ordering::Relaxed) && started.elapsed() < self.refresh {
                std::thread::sleep(STOP_POLL.min(self.refresh.saturating_sub(started.elapsed())));
            }
        }
        info!(symbol = %self.symbol, ticks, "monitoring stopped");
        ticks
    }
}

/// Tick independent monitors in parallel. Results are in input order.
pub fn tick_all(
    monitors: &mut [Monitor],
    provider: &dyn CandleProvider,
    store: &dyn LevelStore,
    notifier: &dyn Notifier,
) -> Vec<Result<TickReport, MonitorError>> {
    monitors
        .par_iter_mut()
        .map(|m| m.tick(provider, store, notifier))
        .collect()
}
