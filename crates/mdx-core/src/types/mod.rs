//! Shared type definitions: enums, market records, and canonical messages.

pub mod enums;
pub mod market;
pub mod message;

pub use enums::{ChannelKind, MarketKind};
pub use market::{Market, SubscriptionRequest};
pub use message::{
    CanonicalMessage, MessageMeta, OrderBookMessage, PriceLevel, TickerMessage, TradeMessage,
};
