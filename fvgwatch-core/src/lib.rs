//! fvgwatch core: domain types, gap detection, the tap-then-confirm engine,
//! indicators and the alert evaluator.
//!
//! This crate has no I/O:
//! - Domain types (candles, timeframes, levels, signals)
//! - Fair Value Gap and swing-level detection
//! - Per-symbol signal engine with monotonic tap cursors
//! - Built-in indicators and a sandboxed script interpreter
//! - Alert rules over indicator output

pub mod alert;
pub mod detection;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod sandbox;
pub mod series;
