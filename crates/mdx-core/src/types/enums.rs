//! Enumerations used throughout the connector.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Market kinds
// ---------------------------------------------------------------------------

/// Market (instrument) category.
///
/// The connector serves `Spot` and `Swap`. The remaining variants exist so a
/// config naming them is rejected with a typed error rather than a serde
/// parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarketKind {
    #[default]
    Spot,
    Swap,
    Future,
    Option,
}

impl std::fmt::Display for MarketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spot => write!(f, "spot"),
            Self::Swap => write!(f, "swap"),
            Self::Future => write!(f, "future"),
            Self::Option => write!(f, "option"),
        }
    }
}

// ---------------------------------------------------------------------------
// Channel kinds
// ---------------------------------------------------------------------------

/// Kind of market-data stream a subscription targets.
///
/// `BestBidOffer` and `OrderBook` ride the same wire channel on most venues
/// and differ only in subscription parameters. `Candle` is part of the
/// abstract vocabulary but not every exchange module exposes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Trade,
    #[serde(rename = "bbo")]
    BestBidOffer,
    #[serde(rename = "orderbook")]
    OrderBook,
    Ticker,
    Candle,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trade => write!(f, "trade"),
            Self::BestBidOffer => write!(f, "bbo"),
            Self::OrderBook => write!(f, "orderbook"),
            Self::Ticker => write!(f, "ticker"),
            Self::Candle => write!(f, "candle"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_round_trip() {
        let kinds: Vec<ChannelKind> =
            serde_json::from_str(r#"["trade", "bbo", "orderbook", "ticker"]"#).unwrap();
        assert_eq!(
            kinds,
            vec![
                ChannelKind::Trade,
                ChannelKind::BestBidOffer,
                ChannelKind::OrderBook,
                ChannelKind::Ticker
            ]
        );
        assert_eq!(serde_json::to_string(&MarketKind::Swap).unwrap(), r#""swap""#);
    }
}
