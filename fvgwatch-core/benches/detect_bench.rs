//! Criterion benchmarks for fvgwatch hot paths.
//!
//! Benchmarks:
//! 1. FVG detection over growing candle windows
//! 2. Signal engine evaluation with many levels
//! 3. Built-in indicators versus the same computation as a script

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use fvgwatch_core::detection::{detect_fvg, DEFAULT_START_OFFSET};
use fvgwatch_core::domain::{Candle, PriceLevel, Timeframe};
use fvgwatch_core::engine::SignalEngine;
use fvgwatch_core::indicators::{BuiltinKind, IndicatorDescriptor, Params};
use fvgwatch_core::sandbox::Sandbox;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_candles(n: usize) -> Vec<Candle> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            let wide = if i % 7 == 0 { 3.0 } else { 1.0 };
            Candle::new(
                base + Duration::minutes(i as i64 * 5),
                close - 0.3,
                close + wide,
                close - wide,
                close,
                1_000.0 + (i % 50) as f64,
            )
        })
        .collect()
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_fvg");
    for n in [200usize, 1_000] {
        let candles = make_candles(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &candles, |b, candles| {
            b.iter(|| detect_fvg(black_box(candles), None, DEFAULT_START_OFFSET))
        });
    }
    group.finish();
}

fn bench_engine(c: &mut Criterion) {
    let trigger = make_candles(200);
    let confirm = make_candles(1_000);
    let levels: Vec<PriceLevel> = (0..50)
        .map(|i| PriceLevel::new(i, 90.0 + i as f64 * 0.4))
        .collect();

    c.bench_function("engine_evaluate_50_levels", |b| {
        b.iter(|| {
            let mut engine = SignalEngine::default();
            let mut levels = levels.clone();
            engine.evaluate(
                black_box(&trigger),
                black_box(&confirm),
                &mut levels,
                "BENCH",
                Timeframe::M15,
                Timeframe::M5,
            )
        })
    });
}

fn bench_indicators(c: &mut Criterion) {
    let mut group = c.benchmark_group("indicators");
    let candles = make_candles(1_000);
    let sandbox = Sandbox::default();
    let none = Params::new();

    let builtin = IndicatorDescriptor::builtin(BuiltinKind::Bollinger);
    group.bench_function("bollinger_builtin", |b| {
        b.iter(|| builtin.run(black_box(&candles), &none, &sandbox))
    });

    let script = IndicatorDescriptor::script(
        "bands",
        r#"
        fn calculate(buf, period = 20, std = 2) {
            let mid = rolling_mean(buf.close, period);
            let sd = rolling_std(buf.close, period);
            return { upper: mid + sd * std, middle: mid, lower: mid - sd * std };
        }
        "#,
        Params::new(),
    );
    group.bench_function("bollinger_script", |b| {
        b.iter(|| script.run(black_box(&candles), &none, &sandbox))
    });

    let looped = IndicatorDescriptor::script(
        "up_count",
        r#"
        fn calculate(buf) {
            let out = series(0);
            for i in range(1, len(buf)) {
                if buf.close[i] > buf.close[i - 1] { out[i] = out[i - 1] + 1; }
            }
            return out;
        }
        "#,
        Params::new(),
    );
    group.bench_function("script_loop", |b| {
        b.iter(|| looped.run(black_box(&candles), &none, &sandbox))
    });

    group.finish();
}

criterion_group!(benches, bench_detection, bench_engine, bench_indicators);
criterion_main!(benches);
