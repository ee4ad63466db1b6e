//! Tap-then-confirm signal engine.
//!
//! A level is *tapped* when a completed trigger-timeframe candle trades
//! through it, and *confirmed* when a Fair Value Gap in the expected
//! direction later forms on the confirmation timeframe. Tap state is owned
//! by one [`SignalEngine`] per monitored symbol; nothing is shared.

pub mod signal_engine;
pub mod tracker;

pub use signal_engine::{EngineConfig, SignalEngine, StalenessPolicy};
pub use tracker::{PriceLevelTracker, TapState};
