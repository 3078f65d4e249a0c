//! # mdx-md
//!
//! Market-data connector: subscribes to an exchange's real-time feed and
//! normalizes its native events into canonical messages for a caller-supplied
//! sink.
//!
//! ## Architecture
//!
//! The entry point validates the request, resolves pairs through the market
//! directory, partitions the `(channel, pair)` cross-product into groups that
//! respect the per-session subscription cap, and starts one [`session`] per
//! group. Each session owns one transport connection, subscribes its group,
//! runs a keepalive timer, and drains an inbound event queue through the
//! exchange's normalizer into the sink.
//!
//! ## Shared infrastructure
//!
//! - [`partition`] — pure subscription partitioner
//! - [`session`] — per-session state machine, keepalive, event dispatch
//! - [`transport`] — transport seam (trait + event type)
//! - [`directory`] — market directory seam + static implementation
//! - [`sink`] — canonical-message sink callback
//! - [`json_util`] — JSON scalar/tuple helpers
//!
//! Exchange specifics live in the [`bitfinex`] module.

pub mod bitfinex;
pub mod directory;
pub mod json_util;
pub mod partition;
pub mod session;
pub mod sink;
pub mod transport;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use mdx_core::config::AppConfig;

use crate::directory::MarketDirectory;
use crate::sink::Sink;

/// Trait implemented by market-data connectors.
///
/// Only `Send` is required (not `Sync`) because connectors are driven
/// sequentially by the runner, never concurrently.
#[async_trait]
pub trait MdConnector: Send {
    /// Human-readable connector name.
    fn name(&self) -> &str;
    /// Open all sessions and begin streaming. Returns once every session has
    /// been told to open; streaming itself is open-ended.
    async fn start(&mut self) -> Result<()>;
    /// Gracefully stop all sessions.
    async fn stop(&mut self) -> Result<()>;
}

/// Create a connector based on the `exchange` field in the config.
pub fn create_connector(
    config: &AppConfig,
    directory: &dyn MarketDirectory,
    sink: Sink,
) -> Result<Box<dyn MdConnector>> {
    match config.exchange.to_lowercase().as_str() {
        "bitfinex" => Ok(Box::new(bitfinex::BitfinexMd::new(
            config,
            directory,
            bitfinex::ws_transport_factory(),
            sink,
        )?)),
        other => Err(anyhow!("unknown exchange: {other}")),
    }
}
