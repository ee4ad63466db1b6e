//! Property tests for detection and signalling invariants.
//!
//! Uses proptest to verify:
//! 1. Determinism: detection has no hidden state
//! 2. Live candle exclusion: the provisional candle never affects gaps
//! 3. At-most-once: one tap-then-gap sequence yields one signal at any cadence
//! 4. Crossover boundary inclusivity
//! 5. Direction policy boundary

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use fvgwatch_core::alert::{check, AlertCondition, AlertRule, CrossDirection};
use fvgwatch_core::detection::{detect_fvg, DEFAULT_START_OFFSET};
use fvgwatch_core::domain::{Candle, ExpectedDirection, PriceLevel, Timeframe};
use fvgwatch_core::engine::SignalEngine;
use fvgwatch_core::series::SeriesOutput;

// ── Strategies (proptest) ────────────────────────────────────────────

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn candle_at(i: usize, low: f64, range: f64) -> Candle {
    let high = low + range;
    let mid = (low + high) / 2.0;
    Candle::new(start() + Duration::minutes(i as i64 * 5), mid, high, low, mid, 10.0)
}

fn arb_candles(max: usize) -> impl Strategy<Value = Vec<Candle>> {
    prop::collection::vec((50.0..150.0_f64, 0.1..10.0_f64), 0..max).prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(i, (low, range))| candle_at(i, low, range))
            .collect()
    })
}

fn arb_live() -> impl Strategy<Value = (f64, f64)> {
    (1.0..500.0_f64, 0.1..50.0_f64)
}

// ── 1. Determinism ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn detection_is_deterministic(candles in arb_candles(40)) {
        let a = detect_fvg(&candles, None, DEFAULT_START_OFFSET);
        let b = detect_fvg(&candles, None, DEFAULT_START_OFFSET);
        prop_assert_eq!(a, b);
    }
}

// ── 2. Live Candle Exclusion ─────────────────────────────────────────

proptest! {
    /// Replacing the provisional candle never changes the result.
    #[test]
    fn live_candle_is_ignored(candles in arb_candles(40), (low, range) in arb_live()) {
        prop_assume!(!candles.is_empty());
        let mut replaced = candles.clone();
        let last = replaced.len() - 1;
        replaced[last] = candle_at(last, low, range);
        prop_assert_eq!(
            detect_fvg(&candles, None, DEFAULT_START_OFFSET),
            detect_fvg(&replaced, None, DEFAULT_START_OFFSET)
        );
    }

    /// Appending a candle only ever adds gaps at the newly completed index.
    #[test]
    fn appending_keeps_earlier_gaps(candles in arb_candles(40), (low, range) in arb_live()) {
        let before = detect_fvg(&candles, None, DEFAULT_START_OFFSET);
        let mut extended = candles.clone();
        extended.push(candle_at(candles.len(), low, range));
        let after = detect_fvg(&extended, None, DEFAULT_START_OFFSET);

        prop_assert!(after.len() >= before.len());
        prop_assert_eq!(&after[..before.len()], &before[..]);
        for gap in &after[before.len()..] {
            prop_assert_eq!(gap.forming_index + 2, extended.len());
        }
    }
}

// ── 3. At-Most-Once Signal ───────────────────────────────────────────

fn tap_trigger() -> Vec<Candle> {
    // Tap of 101 in the first candle, later closes well above it.
    vec![
        candle_at(0, 99.0, 3.0),
        candle_at(3, 103.0, 3.0),
        candle_at(6, 104.0, 3.0),
    ]
}

fn confirm_series(noise: usize) -> Vec<Candle> {
    let mut out = vec![candle_at(0, 99.0, 3.0)];
    let mut i = 1;
    for _ in 0..noise {
        out.push(candle_at(i, 97.0, 2.0));
        i += 1;
    }
    // 98..100, 95..99, 103..105: bullish gap between 100 and 103.
    out.push(candle_at(i, 98.0, 2.0));
    out.push(candle_at(i + 1, 95.0, 4.0));
    out.push(candle_at(i + 2, 103.0, 2.0));
    out.push(candle_at(i + 3, 104.0, 2.0));
    out
}

proptest! {
    #[test]
    fn one_signal_at_any_cadence(
        noise in 0usize..6,
        cuts in prop::collection::vec(1usize..20, 0..8),
    ) {
        let trigger = tap_trigger();
        let confirm = confirm_series(noise);
        let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c.min(confirm.len())).collect();
        cuts.sort_unstable();
        cuts.push(confirm.len());
        cuts.push(confirm.len());

        let mut engine = SignalEngine::default();
        let mut levels = vec![PriceLevel::new(1, 101.0)];
        let mut total = 0;
        for cut in cuts {
            total += engine
                .evaluate(&trigger, &confirm[..cut], &mut levels, "X", Timeframe::M15, Timeframe::M5)
                .len();
        }
        prop_assert_eq!(total, 1);
        prop_assert!(levels[0].triggered);
    }
}

// ── 4. Crossover Boundary ────────────────────────────────────────────

proptest! {
    #[test]
    fn crossover_boundary_inclusivity(threshold in -1000.0..1000.0_f64, eps in 1e-6..10.0_f64) {
        let up = AlertRule::new("x", AlertCondition::Crossover(CrossDirection::CrossesAbove), threshold);
        let on_then_above = SeriesOutput::Single(vec![threshold, threshold + eps]);
        let below_then_on = SeriesOutput::Single(vec![threshold - eps, threshold]);
        prop_assert!(check(&on_then_above, &up).fired);
        prop_assert!(!check(&below_then_on, &up).fired);

        let down = AlertRule::new("x", AlertCondition::Crossover(CrossDirection::CrossesBelow), threshold);
        let on_then_below = SeriesOutput::Single(vec![threshold, threshold - eps]);
        prop_assert!(check(&on_then_below, &down).fired);
    }
}

// ── 5. Direction Policy ──────────────────────────────────────────────

proptest! {
    #[test]
    fn direction_policy_boundary(close in 0.01..100_000.0_f64) {
        prop_assert_eq!(ExpectedDirection::for_level(close * 1.0015, close), ExpectedDirection::Bearish);
        prop_assert_eq!(ExpectedDirection::for_level(close * 0.9985, close), ExpectedDirection::Bullish);
        prop_assert_eq!(ExpectedDirection::for_level(close, close), ExpectedDirection::Either);
    }
}
