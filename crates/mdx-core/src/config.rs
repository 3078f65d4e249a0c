//! Configuration parsing for the connector.
//!
//! Everything is read from a single JSON file. Session knobs (subscription
//! cap, keepalive period, book parameters) are explicit configuration with
//! documented defaults so tests can run with small values.
//!
//! # Example config
//!
//! ```json
//! {
//!   "module_name": "bitfinex_md",
//!   "log_path": "/tmp/mdx-log",
//!   "exchange": "bitfinex",
//!   "market_kind": "spot",
//!   "pairs": ["BTC/USD", "ETH/USD"],
//!   "channels": ["trade", "orderbook", "ticker"],
//!   "session": { "max_subscriptions": 30, "keepalive_interval_sec": 30 }
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::types::{ChannelKind, MarketKind};

/// Hard per-session subscription cap enforced by the exchange.
pub const DEFAULT_SUBSCRIPTION_CAP: usize = 30;
/// Keepalive ping period; idle sessions are dropped by the exchange without it.
pub const DEFAULT_KEEPALIVE_SECS: u64 = 30;
/// Book price-aggregation precision.
pub const DEFAULT_BOOK_PRECISION: &str = "P0";
/// Book depth requested for full order-book subscriptions.
pub const DEFAULT_BOOK_LENGTH: u32 = 25;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Module name, used as the log file prefix.
    pub module_name: Option<String>,

    /// Optional directory for daily-rotating log files.
    pub log_path: Option<String>,

    /// Exchange identifier (currently `"bitfinex"`).
    pub exchange: String,

    /// Market category to connect for.
    pub market_kind: MarketKind,

    /// Unified pair strings (e.g. `["BTC/USD", "ETH/USD"]`).
    pub pairs: Vec<String>,

    /// Channel kinds to subscribe for every pair.
    pub channels: Vec<ChannelKind>,

    /// Skip the REST market directory and derive native symbols by rule.
    pub offline_directory: Option<bool>,

    /// Session tuning; every field has a default.
    pub session: Option<SessionSettings>,
}

/// Per-session tuning knobs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionSettings {
    /// Max subscriptions per transport session.
    pub max_subscriptions: Option<usize>,

    /// Keepalive ping period in seconds.
    pub keepalive_interval_sec: Option<u64>,

    /// Book price-aggregation precision (e.g. `"P0"`).
    pub book_precision: Option<String>,

    /// Depth for full order-book subscriptions.
    pub book_length: Option<u32>,
}

impl AppConfig {
    /// Module name, falling back to the exchange identifier.
    pub fn module_name(&self) -> String {
        self.module_name.clone().unwrap_or_else(|| self.exchange.clone())
    }

    pub fn offline_directory(&self) -> bool {
        self.offline_directory.unwrap_or(false)
    }

    fn session(&self) -> SessionSettings {
        self.session.clone().unwrap_or_default()
    }

    /// Effective per-session subscription cap.
    pub fn subscription_cap(&self) -> usize {
        self.session().max_subscriptions.unwrap_or(DEFAULT_SUBSCRIPTION_CAP)
    }

    /// Effective keepalive period.
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(
            self.session().keepalive_interval_sec.unwrap_or(DEFAULT_KEEPALIVE_SECS),
        )
    }

    /// Effective book precision parameter.
    pub fn book_precision(&self) -> String {
        self.session().book_precision.unwrap_or_else(|| DEFAULT_BOOK_PRECISION.to_string())
    }

    /// Effective book depth parameter.
    pub fn book_length(&self) -> u32 {
        self.session().book_length.unwrap_or(DEFAULT_BOOK_LENGTH)
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}
