//! Canonical message structures — the exchange-agnostic records emitted to
//! the sink.
//!
//! Every message carries the same [`MessageMeta`] block so downstream
//! consumers can route without caring which variant they hold. Fields a feed
//! cannot provide are reported as `0` rather than omitted, keeping the schema
//! uniform across exchanges.
//!
//! # Timestamp convention
//!
//! `timestamp_ms` is **milliseconds since Unix epoch**: the exchange event
//! time where the payload carries one, the local receive time otherwise.

use serde::{Deserialize, Serialize};

use super::enums::{ChannelKind, MarketKind};

// ---------------------------------------------------------------------------
// Common fields
// ---------------------------------------------------------------------------

/// Fields shared by every canonical message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMeta {
    pub exchange: String,
    pub market_kind: MarketKind,
    pub pair: String,
    pub native_id: String,
    /// Wire channel name (e.g. `"trades"`, `"book"`).
    pub channel: String,
    pub channel_kind: ChannelKind,
    pub timestamp_ms: u64,
    /// The raw exchange payload this message was normalized from.
    pub raw: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Price levels
// ---------------------------------------------------------------------------

/// One order-book price level.
///
/// `quantity == 0.0` is a tombstone: the level at `price` is to be removed
/// from the consumer's book.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
    /// Notional cost, `price * quantity`.
    pub cost: f64,
}

impl PriceLevel {
    pub fn new(price: f64, quantity: f64) -> Self {
        Self { price, quantity, cost: price * quantity }
    }
}

// ---------------------------------------------------------------------------
// Message variants
// ---------------------------------------------------------------------------

/// A single normalized trade execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeMessage {
    #[serde(flatten)]
    pub meta: MessageMeta,
    pub price: f64,
    /// Executed base quantity, always `>= 0`.
    pub quantity: f64,
    /// `true` when the trade was sell-initiated.
    pub sell: bool,
    /// Native numeric trade identifier rendered as a string for
    /// cross-exchange uniformity.
    pub trade_id: String,
}

/// A normalized order-book view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookMessage {
    #[serde(flatten)]
    pub meta: MessageMeta,
    /// Ask levels, best (lowest price) first.
    pub asks: Vec<PriceLevel>,
    /// Bid levels, best (highest price) first.
    pub bids: Vec<PriceLevel>,
    /// `true` exactly once per `(session, symbol)`: the first book emitted
    /// after the session subscribed. Everything after is incremental.
    pub full_snapshot: bool,
}

/// A normalized ticker snapshot.
///
/// `open` and `quote_volume` are always `0.0` — this feed does not provide
/// them, and the schema stays uniform across exchanges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerMessage {
    #[serde(flatten)]
    pub meta: MessageMeta,
    pub bid: f64,
    pub bid_size: f64,
    pub ask: f64,
    pub ask_size: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
}

// ---------------------------------------------------------------------------
// CanonicalMessage — tagged union handed to the sink
// ---------------------------------------------------------------------------

/// A tagged union of all canonical message types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CanonicalMessage {
    Trade(TradeMessage),
    OrderBook(OrderBookMessage),
    Ticker(TickerMessage),
}

impl CanonicalMessage {
    /// The common meta block, regardless of variant.
    pub fn meta(&self) -> &MessageMeta {
        match self {
            Self::Trade(m) => &m.meta,
            Self::OrderBook(m) => &m.meta,
            Self::Ticker(m) => &m.meta,
        }
    }
}

// ---------------------------------------------------------------------------
// Display impls
// ---------------------------------------------------------------------------

impl std::fmt::Display for TradeMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = if self.sell { "SELL" } else { "BUY" };
        write!(
            f,
            "Trade({} {side} {:.8}x{:.8} id={})",
            self.meta.pair, self.price, self.quantity, self.trade_id
        )
    }
}

impl std::fmt::Display for OrderBookMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = if self.full_snapshot { "full" } else { "incr" };
        write!(
            f,
            "Book({} {tag} bids={} asks={})",
            self.meta.pair,
            self.bids.len(),
            self.asks.len()
        )
    }
}

impl std::fmt::Display for TickerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Ticker({} bid={:.8} ask={:.8} last={:.8})",
            self.meta.pair, self.bid, self.ask, self.close
        )
    }
}

impl std::fmt::Display for CanonicalMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trade(m) => m.fmt(f),
            Self::OrderBook(m) => m.fmt(f),
            Self::Ticker(m) => m.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_level_cost() {
        let level = PriceLevel::new(100.0, 2.5);
        assert!((level.cost - 250.0).abs() < 1e-12);
        let tombstone = PriceLevel::new(100.0, 0.0);
        assert_eq!(tombstone.cost, 0.0);
    }

    #[test]
    fn meta_accessor_spans_variants() {
        let meta = MessageMeta {
            exchange: "bitfinex".into(),
            market_kind: MarketKind::Spot,
            pair: "BTC/USD".into(),
            native_id: "tBTCUSD".into(),
            channel: "ticker".into(),
            channel_kind: ChannelKind::Ticker,
            timestamp_ms: 1,
            raw: serde_json::Value::Null,
        };
        let msg = CanonicalMessage::Ticker(TickerMessage {
            meta,
            bid: 1.0,
            bid_size: 1.0,
            ask: 2.0,
            ask_size: 1.0,
            open: 0.0,
            high: 2.0,
            low: 1.0,
            close: 1.5,
            volume: 10.0,
            quote_volume: 0.0,
        });
        assert_eq!(msg.meta().pair, "BTC/USD");
    }
}
