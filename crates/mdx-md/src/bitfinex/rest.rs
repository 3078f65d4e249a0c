//! REST-backed market directory.
//!
//! The exchange publishes its tradable pair lists through the public `conf`
//! endpoint; one fetch per market kind is enough to build the full directory
//! at connector startup. Response parsing is separated from the HTTP call so
//! it can be exercised with canned JSON.

use mdx_core::MdxError;
use mdx_core::types::{Market, MarketKind};
use tracing::{debug, info};

use super::{EXCHANGE, symbols};
use crate::directory::StaticDirectory;

const REST_URL: &str = "https://api-pub.bitfinex.com/v2";

/// Conf list key per market kind.
fn list_key(kind: MarketKind) -> Result<&'static str, MdxError> {
    match kind {
        MarketKind::Spot => Ok("pub:list:pair:exchange"),
        MarketKind::Swap => Ok("pub:list:pair:futures"),
        other => Err(MdxError::UnsupportedMarketKind(other)),
    }
}

/// Parse one conf response (`[["BTCUSD", "ADA:USD", …]]`) into markets.
///
/// Listings with no unified spelling (test instruments and the like) are
/// skipped with a trace; an unexpected response shape is an error.
pub fn parse_pair_list(
    kind: MarketKind,
    body: &serde_json::Value,
) -> Result<Vec<Market>, MdxError> {
    let listings = body
        .as_array()
        .and_then(|a| a.first())
        .and_then(|inner| inner.as_array())
        .ok_or_else(|| MdxError::Directory(format!("unexpected conf response: {body}")))?;

    let mut markets = Vec::with_capacity(listings.len());
    for raw in listings {
        let Some(raw) = raw.as_str() else { continue };
        match symbols::to_unified_pair(kind, raw) {
            Ok(pair) => markets.push(Market {
                exchange: EXCHANGE.to_string(),
                kind,
                pair,
                native_id: format!("t{raw}"),
            }),
            Err(e) => debug!("skipping listing {raw}: {e}"),
        }
    }
    Ok(markets)
}

/// Fetch the pair lists for `kinds` and build a directory from them.
pub async fn fetch_directory(kinds: &[MarketKind]) -> Result<StaticDirectory, MdxError> {
    let client = reqwest::Client::new();
    let mut markets = Vec::new();
    for &kind in kinds {
        let url = format!("{REST_URL}/conf/{}", list_key(kind)?);
        let body: serde_json::Value = client
            .get(&url)
            .send()
            .await
            .map_err(|e| MdxError::Directory(e.to_string()))?
            .json()
            .await
            .map_err(|e| MdxError::Directory(e.to_string()))?;
        let parsed = parse_pair_list(kind, &body)?;
        info!("market directory: {} {kind} market(s)", parsed.len());
        markets.extend(parsed);
    }
    Ok(StaticDirectory::new(markets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn spot_listings_parse() {
        let body = json!([["BTCUSD", "ADA:USD", "BTCUST"]]);
        let markets = parse_pair_list(MarketKind::Spot, &body).unwrap();
        assert_eq!(markets.len(), 3);
        assert_eq!(markets[0].pair, "BTC/USD");
        assert_eq!(markets[0].native_id, "tBTCUSD");
        assert_eq!(markets[1].pair, "ADA/USD");
        assert_eq!(markets[1].native_id, "tADA:USD");
        assert_eq!(markets[2].pair, "BTC/USDT");
        assert!(markets.iter().all(|m| m.exchange == EXCHANGE));
    }

    #[test]
    fn swap_listings_parse() {
        let body = json!([["BTCF0:USTF0", "ETHF0:USTF0"]]);
        let markets = parse_pair_list(MarketKind::Swap, &body).unwrap();
        assert_eq!(markets[0].pair, "BTC/USDT:USDT");
        assert_eq!(markets[0].native_id, "tBTCF0:USTF0");
        assert_eq!(markets[1].pair, "ETH/USDT:USDT");
    }

    #[test]
    fn unrecognized_listings_are_skipped() {
        let body = json!([["BTCUSD", "BADPAIR"]]);
        let markets = parse_pair_list(MarketKind::Spot, &body).unwrap();
        assert_eq!(markets.len(), 1);
    }

    #[test]
    fn unexpected_shape_is_an_error() {
        let err = parse_pair_list(MarketKind::Spot, &json!({"pairs": []})).unwrap_err();
        assert!(matches!(err, MdxError::Directory(_)));
    }
}
