//! Market directory seam.
//!
//! Trading-pair strings are resolved to exchange-native instruments by an
//! external directory. The connector treats a missing market — or a market
//! that belongs to a different exchange — as a fatal configuration error
//! surfaced before any session opens.

use mdx_core::MdxError;
use mdx_core::types::{Market, MarketKind};

/// Resolves `(kind, pair)` to a market record. Exactly one match per key is
/// expected.
pub trait MarketDirectory: Send + Sync {
    fn resolve(&self, kind: MarketKind, pair: &str) -> Option<Market>;
}

/// In-memory directory over a fixed market list.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    markets: Vec<Market>,
}

impl StaticDirectory {
    pub fn new(markets: Vec<Market>) -> Self {
        Self { markets }
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}

impl MarketDirectory for StaticDirectory {
    fn resolve(&self, kind: MarketKind, pair: &str) -> Option<Market> {
        self.markets.iter().find(|m| m.kind == kind && m.pair == pair).cloned()
    }
}

/// Resolve every pair up front, checking the exchange identity of each hit.
///
/// Fails with [`MdxError::MarketNotFound`] on the first miss or mismatch;
/// nothing network-facing has happened yet at that point.
pub fn resolve_all(
    directory: &dyn MarketDirectory,
    exchange: &str,
    kind: MarketKind,
    pairs: &[String],
) -> Result<Vec<Market>, MdxError> {
    let mut markets = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let market = directory
            .resolve(kind, pair)
            .filter(|m| m.exchange == exchange)
            .ok_or_else(|| MdxError::MarketNotFound { kind, pair: pair.clone() })?;
        markets.push(market);
    }
    Ok(markets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(pair: &str, native: &str) -> Market {
        Market {
            exchange: "bitfinex".into(),
            kind: MarketKind::Spot,
            pair: pair.into(),
            native_id: native.into(),
        }
    }

    #[test]
    fn resolves_known_pairs() {
        let dir = StaticDirectory::new(vec![market("BTC/USD", "tBTCUSD")]);
        let resolved =
            resolve_all(&dir, "bitfinex", MarketKind::Spot, &["BTC/USD".into()]).unwrap();
        assert_eq!(resolved[0].native_id, "tBTCUSD");
    }

    #[test]
    fn missing_pair_is_market_not_found() {
        let dir = StaticDirectory::new(vec![market("BTC/USD", "tBTCUSD")]);
        let err =
            resolve_all(&dir, "bitfinex", MarketKind::Spot, &["DOGE/USD".into()]).unwrap_err();
        assert!(matches!(err, MdxError::MarketNotFound { .. }));
    }

    #[test]
    fn wrong_kind_is_market_not_found() {
        let dir = StaticDirectory::new(vec![market("BTC/USD", "tBTCUSD")]);
        let err =
            resolve_all(&dir, "bitfinex", MarketKind::Swap, &["BTC/USD".into()]).unwrap_err();
        assert!(matches!(err, MdxError::MarketNotFound { .. }));
    }

    #[test]
    fn exchange_identity_mismatch_is_market_not_found() {
        let mut foreign = market("BTC/USD", "tBTCUSD");
        foreign.exchange = "someother".into();
        let dir = StaticDirectory::new(vec![foreign]);
        let err =
            resolve_all(&dir, "bitfinex", MarketKind::Spot, &["BTC/USD".into()]).unwrap_err();
        assert!(matches!(err, MdxError::MarketNotFound { .. }));
    }
}
