//! Market records and subscription requests.

use serde::{Deserialize, Serialize};

use super::enums::{ChannelKind, MarketKind};

/// A resolved market, as supplied by the market directory.
///
/// Immutable once the connector has started; sessions share the resolved
/// market list read-only. Exactly one market is expected per `(kind, pair)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    /// Exchange identity (e.g. `"bitfinex"`).
    pub exchange: String,
    /// Market category this instrument belongs to.
    pub kind: MarketKind,
    /// Unified pair string (e.g. `"BTC/USD"`).
    pub pair: String,
    /// Exchange-native instrument identifier (e.g. `"tBTCUSD"`).
    pub native_id: String,
}

/// One requested `(channel, pair)` subscription.
///
/// Built by the connector entry point, consumed by the partitioner; each
/// session owns its group of requests for the session's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub channel: ChannelKind,
    pub pair: String,
}

impl SubscriptionRequest {
    pub fn new(channel: ChannelKind, pair: impl Into<String>) -> Self {
        Self { channel, pair: pair.into() }
    }
}
