//! fvgwatch CLI: gap detection, indicator runs, live scanning and replay.
//!
//! Commands:
//! - `detect`: list Fair Value Gaps (and optionally swing levels) in a candle file
//! - `indicator`: run a built-in or scripted indicator over a candle file
//! - `scan`: monitor a symbol from a TOML config, reading candle files each tick
//! - `replay`: push recorded candle files through a monitor, candle by candle
//! - `library`: list the built-in indicators

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fvgwatch_core::detection::{detect_fvg, swing_levels, DEFAULT_START_OFFSET};
use fvgwatch_core::domain::{Candle, FvgDirection};
use fvgwatch_core::indicators::{builtin_library, BuiltinKind, IndicatorDescriptor, Params};
use fvgwatch_core::sandbox::Sandbox;
use fvgwatch_runner::{
    discord_payload, load_candles, replay, FileProvider, JsonLinesNotifier, LogNotifier,
    MemoryLevelStore, Monitor, MonitorConfig, Notification, Notifier, ReplayProvider,
};

#[derive(Parser)]
#[command(
    name = "fvgwatch",
    about = "fvgwatch: level taps confirmed by Fair Value Gaps, plus scripted indicator alerts"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Bullish,
    Bearish,
}

impl From<DirectionArg> for FvgDirection {
    fn from(d: DirectionArg) -> Self {
        match d {
            DirectionArg::Bullish => FvgDirection::Bullish,
            DirectionArg::Bearish => FvgDirection::Bearish,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List Fair Value Gaps in a candle file (CSV or JSON).
    Detect {
        /// Candle file. The last candle is treated as live.
        file: PathBuf,

        /// Only report gaps in this direction.
        #[arg(long, value_enum)]
        direction: Option<DirectionArg>,

        /// First forming index to consider.
        #[arg(long, default_value_t = DEFAULT_START_OFFSET)]
        start: usize,

        /// Drop gaps smaller than this.
        #[arg(long, default_value_t = 0.0)]
        min_gap: f64,

        /// Also list swing highs/lows using this half-window.
        #[arg(long)]
        swings: Option<usize>,

        /// Print JSON instead of text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run an indicator over a candle file and print its output.
    Indicator {
        /// Candle file (CSV or JSON).
        file: PathBuf,

        /// Built-in indicator id (see `library`).
        #[arg(long, conflicts_with = "script")]
        builtin: Option<String>,

        /// Script file defining `calculate(buf, ...)`.
        #[arg(long)]
        script: Option<PathBuf>,

        /// Parameter override, `name=value`. Repeatable.
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, f64)>,

        /// Only print the last N rows.
        #[arg(long, default_value_t = 10)]
        tail: usize,
    },
    /// Monitor a symbol, re-reading `{symbol}_{timeframe}.csv|json` every refresh.
    Scan {
        /// Monitor config (TOML).
        #[arg(long)]
        config: PathBuf,

        /// Directory holding the candle files.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Run a single tick and exit.
        #[arg(long, default_value_t = false)]
        once: bool,

        /// Append notifications to this JSON-lines file instead of logging them.
        #[arg(long)]
        jsonl: Option<PathBuf>,
    },
    /// Replay recorded trigger/confirmation candle files through a monitor.
    Replay {
        /// Monitor config (TOML).
        #[arg(long)]
        config: PathBuf,

        /// Trigger-timeframe candle file.
        #[arg(long)]
        trigger: PathBuf,

        /// Confirmation-timeframe candle file.
        #[arg(long)]
        confirm: PathBuf,

        /// Print the webhook payload of every notification.
        #[arg(long, default_value_t = false)]
        payloads: bool,
    },
    /// List the built-in indicators and their default parameters.
    Library,
}

fn parse_param(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("bad value for '{name}': {e}"))?;
    Ok((name.trim().to_string(), value))
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fvgwatch=info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Detect {
            file,
            direction,
            start,
            min_gap,
            swings,
            json,
        } => run_detect(&file, direction.map(Into::into), start, min_gap, swings, json),
        Commands::Indicator {
            file,
            builtin,
            script,
            params,
            tail,
        } => run_indicator(&file, builtin, script, params, tail),
        Commands::Scan {
            config,
            data_dir,
            once,
            jsonl,
        } => run_scan(&config, data_dir, once, jsonl),
        Commands::Replay {
            config,
            trigger,
            confirm,
            payloads,
        } => run_replay(&config, &trigger, &confirm, payloads),
        Commands::Library => run_library(),
    }
}

fn read_candles(path: &Path) -> Result<Vec<Candle>> {
    let candles = load_candles(path).with_context(|| format!("loading {}", path.display()))?;
    if candles.is_empty() {
        bail!("{} holds no candles", path.display());
    }
    Ok(candles)
}

fn run_detect(
    file: &Path,
    direction: Option<FvgDirection>,
    start: usize,
    min_gap: f64,
    swings: Option<usize>,
    json: bool,
) -> Result<()> {
    if !min_gap.is_finite() || min_gap < 0.0 {
        bail!("--min-gap must be a non-negative number");
    }
    let candles = read_candles(file)?;
    let gaps: Vec<_> = detect_fvg(&candles, direction, start)
        .into_iter()
        .filter(|g| g.gap_size >= min_gap)
        .collect();
    let swing_points = swings.map(|w| swing_levels(&candles, w)).unwrap_or_default();

    if json {
        let rows: Vec<serde_json::Value> = gaps
            .iter()
            .map(|g| {
                serde_json::json!({
                    "direction": g.direction,
                    "timestamp": g.timestamp,
                    "gap_low": g.gap_low,
                    "gap_high": g.gap_high,
                    "gap_size": g.gap_size,
                    "midpoint": g.midpoint(),
                    "recommendation": g.recommendation(),
                })
            })
            .collect();
        let out = serde_json::json!({ "gaps": rows, "swings": swing_points });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!(
        "{} candles ({} completed), {} gap(s)",
        candles.len(),
        candles.len().saturating_sub(1),
        gaps.len()
    );
    for g in &gaps {
        let rec = g.recommendation();
        println!(
            "{}  {:<7}  {:>12.4} - {:<12.4} size {:<10.4} {:?} @ {:.4}  SL {:.4}  TP {:.4}  R/R {:.2}",
            g.timestamp.format("%Y-%m-%d %H:%M"),
            g.direction.to_string(),
            g.gap_low,
            g.gap_high,
            g.gap_size,
            rec.action,
            rec.entry,
            rec.stop_loss,
            rec.take_profit,
            rec.risk_reward,
        );
    }
    for s in &swing_points {
        println!("{}  {:?}  {:.4}", s.timestamp.format("%Y-%m-%d %H:%M"), s.kind, s.price);
    }
    Ok(())
}

fn run_indicator(
    file: &Path,
    builtin: Option<String>,
    script: Option<PathBuf>,
    params: Vec<(String, f64)>,
    tail: usize,
) -> Result<()> {
    let descriptor = match (builtin, script) {
        (Some(id), None) => {
            let kind: BuiltinKind = id.parse().map_err(anyhow::Error::msg)?;
            IndicatorDescriptor::builtin(kind)
        }
        (None, Some(path)) => {
            let code = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let id = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "script".to_string());
            IndicatorDescriptor::script(id, code, Params::new())
        }
        _ => bail!("give exactly one of --builtin or --script"),
    };

    let candles = read_candles(file)?;
    let overrides: Params = params.into_iter().collect();
    let output = descriptor.run(&candles, &overrides, &Sandbox::default())?;

    let names = output.names();
    println!("timestamp,{}", names.join(","));
    let start = candles.len().saturating_sub(tail);
    for (i, candle) in candles.iter().enumerate().skip(start) {
        let row: Vec<String> = names
            .iter()
            .map(|n| {
                output
                    .get(n)
                    .and_then(|s| s.get(i))
                    .map_or_else(String::new, |v| if v.is_nan() { String::new() } else { format!("{v:.6}") })
            })
            .collect();
        println!("{},{}", candle.timestamp.to_rfc3339(), row.join(","));
    }
    Ok(())
}

fn seeded_store(config: &MonitorConfig) -> Result<MemoryLevelStore> {
    let store = MemoryLevelStore::new();
    for level in &config.levels {
        store.add_level(&config.monitor.symbol, level.clone())?;
    }
    Ok(store)
}

fn run_scan(config_path: &Path, data_dir: PathBuf, once: bool, jsonl: Option<PathBuf>) -> Result<()> {
    let config = MonitorConfig::from_file(config_path)?;
    let store = seeded_store(&config)?;
    let provider = FileProvider::new(data_dir);
    let mut monitor = Monitor::from_config(&config)?;

    let notifier: Box<dyn Notifier> = match jsonl {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening {}", path.display()))?;
            Box::new(JsonLinesNotifier::new(file))
        }
        None => Box::new(LogNotifier),
    };

    if once {
        let report = monitor.tick(&provider, &store, notifier.as_ref())?;
        info!(
            signals = report.signals.len(),
            alerts = report.alerts.len(),
            failed_indicators = report.indicator_failures.len(),
            "tick done"
        );
        return Ok(());
    }

    // Nothing sets the flag; the loop ends when the process is interrupted.
    let stop = AtomicBool::new(false);
    monitor.run(&provider, &store, notifier.as_ref(), &stop);
    Ok(())
}

fn run_replay(config_path: &Path, trigger: &Path, confirm: &Path, payloads: bool) -> Result<()> {
    let config = MonitorConfig::from_file(config_path)?;
    let m = &config.monitor;
    let provider = ReplayProvider::new()
        .with_series(&m.symbol, m.trigger_timeframe, read_candles(trigger)?)
        .with_series(&m.symbol, m.confirm_timeframe, read_candles(confirm)?);
    let store = seeded_store(&config)?;
    let notifier = LogNotifier;
    let mut monitor = Monitor::from_config(&config)?;

    let summary = replay(&mut monitor, &provider, &store, &notifier)?;

    println!(
        "replayed {} step(s) from {} to {}: {} signal(s), {} alert(s)",
        summary.ticks,
        summary.first.map(|t| t.to_rfc3339()).unwrap_or_default(),
        summary.last.map(|t| t.to_rfc3339()).unwrap_or_default(),
        summary.signal_count(),
        summary.alert_count(),
    );
    for report in &summary.reports {
        for s in &report.signals {
            println!(
                "SIGNAL  level {:.4} tapped {}  {} gap {:.4}-{:.4} at {}",
                s.level_price,
                s.tap_timestamp.format("%Y-%m-%d %H:%M"),
                s.fvg_direction,
                s.gap_low,
                s.gap_high,
                s.fvg_timestamp.format("%Y-%m-%d %H:%M"),
            );
        }
        for a in &report.alerts {
            println!(
                "ALERT   {} {} at {}",
                a.indicator_name,
                a.condition,
                a.candle_timestamp.format("%Y-%m-%d %H:%M")
            );
        }
        for f in &report.indicator_failures {
            eprintln!("indicator {} failed: {}", f.indicator_id, f.error);
        }
    }

    if payloads {
        let username = m.username.as_deref().unwrap_or("fvgwatch");
        let notifications = summary.reports.iter().flat_map(|r| {
            r.signals
                .iter()
                .cloned()
                .map(Notification::Signal)
                .chain(r.alerts.iter().cloned().map(Notification::Alert))
        });
        for n in notifications {
            println!("{}", serde_json::to_string_pretty(&discord_payload(&n, username))?);
        }
    }
    Ok(())
}

fn run_library() -> Result<()> {
    println!("{:<8} {:<28} {:<12} defaults", "id", "name", "category");
    for d in builtin_library() {
        let defaults: Vec<String> = d.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        println!("{:<8} {:<28} {:<12} {}", d.id, d.name, d.category, defaults.join(" "));
    }
    Ok(())
}
