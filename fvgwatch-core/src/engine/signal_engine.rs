//! Signal engine: taps on the trigger series, gaps on the confirmation series.

use chrono::Duration;
use tracing::{debug, info};

use super::tracker::{PriceLevelTracker, TapState};
use crate::detection::{detect_fvg, Fvg, DEFAULT_START_OFFSET};
use crate::domain::{completed, Candle, LevelId, PriceLevel, Signal, Timeframe};

/// How long a tap may wait for its confirmation gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalenessPolicy {
    /// Taps wait forever.
    #[default]
    Never,
    /// Only the first `n` completed confirmation candles after the tap count.
    AfterCandles(usize),
    /// Only gaps forming within this span after the tap count.
    AfterDuration(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Gaps smaller than this never confirm. 0 accepts every gap.
    pub min_gap_size: f64,
    pub staleness: StalenessPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_gap_size: 0.0,
            staleness: StalenessPolicy::Never,
        }
    }
}

enum Attempt {
    Confirmed(Fvg),
    Waiting,
    Expired,
}

/// Owns the tap state for one symbol and turns taps into signals.
///
/// [`SignalEngine::evaluate`] is the only mutator of tap state and of the
/// `triggered` flags it is handed. Each (level, tap) yields at most one
/// signal.
#[derive(Debug, Clone, Default)]
pub struct SignalEngine {
    config: EngineConfig,
    tracker: PriceLevelTracker,
}

impl SignalEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            tracker: PriceLevelTracker::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one evaluation pass.
    ///
    /// New taps are detected on `trigger`; then every level holding a tap,
    /// new or old, looks for the earliest qualifying gap among `confirm`
    /// candles strictly after its tap. A confirmed level is marked
    /// `triggered` and its tap is consumed. Tap state for ids no longer in
    /// `levels` is dropped.
    pub fn evaluate(
        &mut self,
        trigger: &[Candle],
        confirm: &[Candle],
        levels: &mut [PriceLevel],
        symbol: &str,
        trigger_tf: Timeframe,
        confirm_tf: Timeframe,
    ) -> Vec<Signal> {
        self.tracker
            .retain(|id| levels.iter().any(|level| level.id == id));
        self.tracker.scan(trigger, levels);

        let mut signals = Vec::new();
        for level in levels.iter_mut() {
            if !level.is_armed() {
                continue;
            }
            let Some(tap) = self.tracker.tap(level.id) else {
                continue;
            };

            match self.attempt(tap, confirm) {
                Attempt::Confirmed(gap) => {
                    let Some(tap) = self.tracker.take(level.id) else {
                        continue;
                    };
                    let signal = Signal {
                        symbol: symbol.to_string(),
                        trigger_timeframe: trigger_tf,
                        confirm_timeframe: confirm_tf,
                        level_id: level.id,
                        level_price: level.price,
                        trigger_price: tap.tap_close,
                        tap_timestamp: tap.tap_timestamp,
                        fvg_direction: gap.direction,
                        fvg_timestamp: gap.timestamp,
                        gap_low: gap.gap_low,
                        gap_high: gap.gap_high,
                        gap_size: gap.gap_size,
                        expected_direction: tap.expected_direction,
                    };
                    level.triggered = true;
                    info!(
                        symbol,
                        level = %level.id,
                        price = level.price,
                        direction = %gap.direction,
                        gap_low = gap.gap_low,
                        gap_high = gap.gap_high,
                        "signal confirmed"
                    );
                    signals.push(signal);
                }
                Attempt::Waiting => {}
                Attempt::Expired => {
                    info!(
                        symbol,
                        level = %level.id,
                        tapped_at = %tap.tap_timestamp,
                        "tap expired without confirmation"
                    );
                    self.tracker.take(level.id);
                }
            }
        }

        signals
    }

    fn attempt(&self, tap: &TapState, confirm: &[Candle]) -> Attempt {
        let start = confirm.partition_point(|c| c.timestamp <= tap.tap_timestamp);
        let after = &confirm[start..];
        let closed = completed(after);

        let gap = detect_fvg(after, tap.expected_direction.filter(), DEFAULT_START_OFFSET)
            .into_iter()
            .filter(|gap| gap.gap_size >= self.config.min_gap_size)
            .find(|gap| match self.config.staleness {
                StalenessPolicy::Never => true,
                StalenessPolicy::AfterCandles(n) => gap.forming_index < n,
                StalenessPolicy::AfterDuration(d) => gap.timestamp - tap.tap_timestamp <= d,
            });

        if let Some(gap) = gap {
            return Attempt::Confirmed(gap);
        }

        let expired = match self.config.staleness {
            StalenessPolicy::Never => false,
            StalenessPolicy::AfterCandles(n) => closed.len() >= n,
            StalenessPolicy::AfterDuration(d) => closed
                .last()
                .is_some_and(|c| c.timestamp - tap.tap_timestamp > d),
        };
        if expired {
            Attempt::Expired
        } else {
            debug!(
                level = %tap.level_id,
                candles_after_tap = closed.len(),
                "awaiting confirmation"
            );
            Attempt::Waiting
        }
    }

    /// Clear the tap for `id` so the level can arm again once the caller
    /// clears `triggered`. The scan cursor is kept.
    pub fn reset_level(&mut self, id: LevelId) {
        self.tracker.take(id);
    }

    /// Drop every trace of a deleted level.
    pub fn forget_level(&mut self, id: LevelId) {
        self.tracker.forget(id);
    }

    pub fn pending_taps(&self) -> impl Iterator<Item = &TapState> {
        self.tracker.pending()
    }

    pub fn tracker(&self) -> &PriceLevelTracker {
        &self.tracker
    }
}
