//! Replays recorded candles through the monitor, end to end: config, provider,
//! engine, alerts, level store and notifications.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};

use fvgwatch_core::domain::{Candle, FvgDirection, LevelId, PriceLevel, Timeframe};
use fvgwatch_runner::{
    replay, tick_all, CollectingNotifier, JsonLinesNotifier, LevelStore, MemoryLevelStore,
    Monitor, MonitorConfig, MonitorError, Notification, Notifier, NotifyError, ReplayProvider,
};

// ── Fixtures ─────────────────────────────────────────────────────────

fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
}

fn candle(minutes: i64, low: f64, high: f64, close: f64) -> Candle {
    Candle::new(at(minutes), close, high, low, close, 50.0)
}

fn trigger_15m() -> Vec<Candle> {
    vec![
        candle(0, 103.0, 106.0, 105.0),
        candle(15, 99.0, 102.0, 101.5),
        candle(30, 103.0, 106.0, 105.0),
        candle(45, 104.0, 107.0, 106.0),
        candle(60, 105.0, 107.0, 106.0),
    ]
}

fn confirm_5m() -> Vec<Candle> {
    let mut out = vec![
        candle(0, 104.0, 106.0, 105.0),
        candle(5, 104.0, 106.0, 105.0),
        candle(10, 104.0, 106.0, 105.0),
        candle(15, 100.0, 102.0, 101.0),
        candle(20, 98.0, 100.0, 99.0),
        candle(25, 95.0, 99.0, 98.0),
        candle(30, 103.0, 105.0, 104.0),
    ];
    out.extend((7..15).map(|i| candle(i * 5, 104.0, 106.0, 105.0)));
    out
}

fn provider_for(symbols: &[&str]) -> ReplayProvider {
    symbols.iter().fold(ReplayProvider::new(), |p, s| {
        p.with_series(s, Timeframe::M15, trigger_15m())
            .with_series(s, Timeframe::M5, confirm_5m())
    })
}

fn config(symbol: &str) -> MonitorConfig {
    MonitorConfig::from_toml(&format!(
        r#"
[monitor]
symbol = "{symbol}"
trigger_timeframe = "15m"
confirm_timeframe = "5m"

[[indicators]]
id = "close"
code = "fn calculate(buf) {{ return buf.close; }}"

[[alerts]]
indicator_id = "close"
kind = "value"
condition = "above"
threshold = 105.5
"#
    ))
    .unwrap()
}

fn store_with_level(symbols: &[&str]) -> MemoryLevelStore {
    let store = MemoryLevelStore::new();
    for s in symbols {
        store.add_level(s, PriceLevel::new(1, 101.0)).unwrap();
    }
    store
}

struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn send(&self, _: &Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Io(std::io::Error::other("webhook down")))
    }
}

// ── Replay ───────────────────────────────────────────────────────────

#[test]
fn replay_fires_one_signal_and_one_alert() {
    let provider = provider_for(&["BTCUSDT"]);
    let store = store_with_level(&["BTCUSDT"]);
    let notifier = CollectingNotifier::new();
    let mut monitor = Monitor::from_config(&config("BTCUSDT")).unwrap();

    let summary = replay(&mut monitor, &provider, &store, &notifier).unwrap();

    assert_eq!(summary.ticks, 15);
    assert_eq!(summary.signal_count(), 1);
    assert_eq!(summary.alert_count(), 1);

    let signals = notifier.signals();
    assert_eq!(signals.len(), 1);
    let s = &signals[0];
    assert_eq!(s.level_id, LevelId(1));
    assert_eq!(s.fvg_direction, FvgDirection::Bullish);
    assert_eq!(s.tap_timestamp, at(15));
    assert_eq!(s.fvg_timestamp, at(30));
    assert_eq!(s.trigger_price, 101.5);
    assert_eq!((s.gap_low, s.gap_high), (100.0, 103.0));

    // The signal fired on the tick where the 30-minute candle completed.
    let fired_at = summary
        .reports
        .iter()
        .position(|r| !r.signals.is_empty())
        .unwrap();
    assert_eq!(fired_at, 7);

    let alerts = notifier.alerts();
    assert_eq!(alerts[0].candle_timestamp, at(45));
    assert_eq!(alerts[0].indicator_id, "close");

    assert!(store.load_levels("BTCUSDT").unwrap()[0].triggered);
}

#[test]
fn replay_writes_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let file = std::fs::File::create(&path).unwrap();
    let notifier = JsonLinesNotifier::new(file);

    let provider = provider_for(&["BTCUSDT"]);
    let store = store_with_level(&["BTCUSDT"]);
    let mut monitor = Monitor::from_config(&config("BTCUSDT")).unwrap();
    replay(&mut monitor, &provider, &store, &notifier).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let kinds: Vec<String> = text
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["type"].to_string())
        .collect();
    assert_eq!(kinds, vec!["\"signal\"", "\"alert\""]);
}

// ── Failure handling ─────────────────────────────────────────────────

#[test]
fn delivery_failure_does_not_undo_signal() {
    let provider = provider_for(&["BTCUSDT"]);
    provider.set_clock(at(70)).unwrap();
    let store = store_with_level(&["BTCUSDT"]);
    let mut monitor = Monitor::from_config(&config("BTCUSDT")).unwrap();

    let report = monitor.tick(&provider, &store, &FailingNotifier).unwrap();
    assert_eq!(report.signals.len(), 1);
    assert_eq!(report.undelivered, 2);
    assert!(store.load_levels("BTCUSDT").unwrap()[0].triggered);

    let again = monitor.tick(&provider, &store, &FailingNotifier).unwrap();
    assert!(again.signals.is_empty());
    assert!(again.alerts.is_empty());
}

#[test]
fn missing_series_aborts_the_tick() {
    let provider = ReplayProvider::new().with_series("BTCUSDT", Timeframe::M15, trigger_15m());
    let store = store_with_level(&["BTCUSDT"]);
    let mut monitor = Monitor::from_config(&config("BTCUSDT")).unwrap();
    let err = monitor.tick(&provider, &store, &CollectingNotifier::new()).unwrap_err();
    assert!(matches!(err, MonitorError::Provider(_)));
    assert_eq!(monitor.engine().pending_taps().count(), 0);
}

#[test]
fn failing_indicator_is_reported_not_fatal() {
    let mut config = config("BTCUSDT");
    config.sandbox.max_steps = 50;
    config.indicators[0].code =
        Some("fn calculate(buf) { while true { let x = 1; } return buf.close; }".into());
    let provider = provider_for(&["BTCUSDT"]);
    provider.set_clock(at(70)).unwrap();
    let store = store_with_level(&["BTCUSDT"]);
    let mut monitor = Monitor::from_config(&config).unwrap();

    let report = monitor.tick(&provider, &store, &CollectingNotifier::new()).unwrap();
    assert_eq!(report.signals.len(), 1);
    assert_eq!(report.indicator_failures.len(), 1);
    assert_eq!(report.indicator_failures[0].indicator_id, "close");
}

// ── Concurrency ──────────────────────────────────────────────────────

#[test]
fn monitors_tick_in_parallel_with_separate_state() {
    let symbols = ["BTCUSDT", "ETHUSDT", "SOLUSDT"];
    let provider = provider_for(&symbols);
    provider.set_clock(at(70)).unwrap();
    let store = store_with_level(&symbols);
    let notifier = CollectingNotifier::new();

    let mut monitors: Vec<Monitor> = symbols
        .iter()
        .map(|s| Monitor::from_config(&config(s)).unwrap())
        .collect();
    let results = tick_all(&mut monitors, &provider, &store, &notifier);

    assert_eq!(results.len(), 3);
    for (result, symbol) in results.iter().zip(symbols) {
        let report = result.as_ref().unwrap();
        assert_eq!(report.signals.len(), 1);
        assert_eq!(report.signals[0].symbol, symbol);
    }
    assert_eq!(notifier.signals().len(), 3);
}

#[test]
fn run_stops_when_flag_is_set() {
    let mut config = config("BTCUSDT");
    config.monitor.refresh_secs = 5;
    let provider = provider_for(&["BTCUSDT"]);
    let store = store_with_level(&["BTCUSDT"]);
    let notifier = CollectingNotifier::new();
    let mut monitor = Monitor::from_config(&config).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let stopper = {
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            std::thread::sleep(StdDuration::from_millis(200));
            stop.store(true, Ordering::Relaxed);
        })
    };
    let ticks = monitor.run(&provider, &store, &notifier, &stop);
    stopper.join().unwrap();

    assert_eq!(ticks, 1);
    assert_eq!(notifier.signals().len(), 1);
}
