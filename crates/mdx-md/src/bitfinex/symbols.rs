//! Native symbol derivation.
//!
//! Unified pairs (`"BTC/USD"`, `"BTC/USDT:USDT"`) convert to the exchange's
//! wire identifiers: `t`-prefixed concatenation for spot (with a `:`
//! separator once either leg exceeds three characters), `F0`-suffixed legs
//! for perpetual swaps (the exchange labels USDT-margined perps `USTF0`).

use mdx_core::MdxError;
use mdx_core::types::MarketKind;

/// Currency code translation between unified and wire spellings.
fn to_wire_currency(code: &str) -> String {
    match code {
        "USDT" => "UST".to_string(),
        other => other.to_string(),
    }
}

fn from_wire_currency(code: &str) -> String {
    match code {
        "UST" => "USDT".to_string(),
        other => other.to_string(),
    }
}

/// Derive the exchange-native symbol for a unified pair.
pub fn to_native_symbol(kind: MarketKind, pair: &str) -> Result<String, MdxError> {
    let (base, rest) = pair
        .split_once('/')
        .ok_or_else(|| MdxError::Config(format!("malformed pair: {pair}")))?;
    // Swap pairs carry a ":settle" suffix on the quote leg.
    let quote = rest.split(':').next().unwrap_or(rest);
    if base.is_empty() || quote.is_empty() {
        return Err(MdxError::Config(format!("malformed pair: {pair}")));
    }

    match kind {
        MarketKind::Spot => {
            let base = to_wire_currency(base);
            let quote = to_wire_currency(quote);
            if base.len() > 3 || quote.len() > 3 {
                Ok(format!("t{base}:{quote}"))
            } else {
                Ok(format!("t{base}{quote}"))
            }
        }
        MarketKind::Swap => {
            let base = to_wire_currency(base);
            let quote = to_wire_currency(quote);
            Ok(format!("t{base}F0:{quote}F0"))
        }
        other => Err(MdxError::UnsupportedMarketKind(other)),
    }
}

/// Reconstruct the unified pair from a raw directory listing entry
/// (`"BTCUSD"`, `"ADA:USD"`, `"BTCF0:USTF0"`).
pub fn to_unified_pair(kind: MarketKind, raw: &str) -> Result<String, MdxError> {
    match kind {
        MarketKind::Spot => {
            let (base, quote) = match raw.split_once(':') {
                Some((b, q)) => (b.to_string(), q.to_string()),
                // Listings without a separator are a 3+3 concatenation.
                None if raw.len() == 6 => (raw[..3].to_string(), raw[3..].to_string()),
                None => {
                    return Err(MdxError::Directory(format!("unrecognized spot listing: {raw}")));
                }
            };
            Ok(format!("{}/{}", from_wire_currency(&base), from_wire_currency(&quote)))
        }
        MarketKind::Swap => {
            let (base, quote) = raw
                .split_once(':')
                .ok_or_else(|| MdxError::Directory(format!("unrecognized swap listing: {raw}")))?;
            let base = base
                .strip_suffix("F0")
                .ok_or_else(|| MdxError::Directory(format!("unrecognized swap listing: {raw}")))?;
            let quote = quote
                .strip_suffix("F0")
                .ok_or_else(|| MdxError::Directory(format!("unrecognized swap listing: {raw}")))?;
            let settle = from_wire_currency(quote);
            Ok(format!("{}/{}:{}", from_wire_currency(base), settle, settle))
        }
        other => Err(MdxError::UnsupportedMarketKind(other)),
    }
}
