//! fvgwatch runner: everything around the pure core that a host needs.
//!
//! This crate builds on `fvgwatch-core` to provide:
//! - TOML monitor configuration with up-front validation
//! - Collaborator traits for candles, level storage and notifications
//! - File-backed candle loading and a replay provider
//! - The per-symbol monitor loop and parallel ticking of many monitors
//! - Webhook payload formatting

pub mod config;
pub mod data_loader;
pub mod monitor;
pub mod notify;
pub mod provider;
pub mod replay;
pub mod store;

pub use config::{ConfigError, IndicatorEntry, MonitorConfig, StalenessConfig};
pub use data_loader::{load_candles, LoadError};
pub use monitor::{tick_all, IndicatorFailure, Monitor, MonitorError, TickReport};
pub use notify::{
    discord_payload, AlertEvent, CollectingNotifier, JsonLinesNotifier, LogNotifier, Notification,
    Notifier, NotifyError,
};
pub use provider::{CandleProvider, FileProvider, ProviderError, ReplayProvider};
pub use replay::{replay, ReplaySummary};
pub use store::{LevelStore, MemoryLevelStore, StoreError};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn monitor_is_send() {
        assert_send::<Monitor>();
    }

    #[test]
    fn collaborators_are_send_sync() {
        assert_send::<MemoryLevelStore>();
        assert_sync::<MemoryLevelStore>();
        assert_send::<ReplayProvider>();
        assert_sync::<ReplayProvider>();
        assert_send::<FileProvider>();
        assert_sync::<FileProvider>();
        assert_send::<CollectingNotifier>();
        assert_sync::<CollectingNotifier>();
        assert_sync::<JsonLinesNotifier<Vec<u8>>>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<MonitorConfig>();
        assert_sync::<MonitorConfig>();
        assert_send::<TickReport>();
        assert_sync::<TickReport>();
    }
}
