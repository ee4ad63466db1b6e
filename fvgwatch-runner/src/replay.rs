//! Offline replay of recorded candles through a [`Monitor`].

use chrono::{DateTime, Utc};
use tracing::info;

use crate::monitor::{Monitor, MonitorError, TickReport};
use crate::notify::Notifier;
use crate::provider::ReplayProvider;
use crate::store::LevelStore;

/// Totals over a whole replay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaySummary {
    pub ticks: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub reports: Vec<TickReport>,
}

impl ReplaySummary {
    pub fn signal_count(&self) -> usize {
        self.reports.iter().map(|r| r.signals.len()).sum()
    }

    pub fn alert_count(&self) -> usize {
        self.reports.iter().map(|r| r.alerts.len()).sum()
    }
}

/// Step the provider's clock through every candle open time and tick once
/// per step, as a live monitor refreshing at least once per candle would.
pub fn replay(
    monitor: &mut Monitor,
    provider: &ReplayProvider,
    store: &dyn LevelStore,
    notifier: &dyn Notifier,
) -> Result<ReplaySummary, MonitorError> {
    let timeline = provider.timeline();
    let mut summary = ReplaySummary {
        first: timeline.first().copied(),
        last: timeline.last().copied(),
        ..ReplaySummary::default()
    };

    for now in timeline {
        provider.set_clock(now)?;
        summary.reports.push(monitor.tick(provider, store, notifier)?);
        summary.ticks += 1;
    }

    info!(
        symbol = monitor.symbol(),
        ticks = summary.ticks,
        signals = summary.signal_count(),
        alerts = summary.alert_count(),
        "replay finished"
    );
    Ok(summary)
}
