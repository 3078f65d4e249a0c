//! Channel name mapping.
//!
//! Best-bid-offer and full order-book subscriptions ride the same `book`
//! wire channel and differ only in subscription parameters (depth 1 vs the
//! configured depth), so both kinds map to `"book"` here.

use mdx_core::MdxError;
use mdx_core::types::ChannelKind;

/// Map an abstract channel kind to the wire channel name.
///
/// Fails with [`MdxError::UnsupportedChannel`] for kinds this exchange does
/// not expose; no subscription is attempted for those.
pub fn channel_name(kind: ChannelKind) -> Result<&'static str, MdxError> {
    match kind {
        ChannelKind::Trade => Ok("trades"),
        ChannelKind::BestBidOffer | ChannelKind::OrderBook => Ok("book"),
        ChannelKind::Ticker => Ok("ticker"),
        ChannelKind::Candle => Err(MdxError::UnsupportedChannel(kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_kinds_map() {
        assert_eq!(channel_name(ChannelKind::Trade).unwrap(), "trades");
        assert_eq!(channel_name(ChannelKind::BestBidOffer).unwrap(), "book");
        assert_eq!(channel_name(ChannelKind::OrderBook).unwrap(), "book");
        assert_eq!(channel_name(ChannelKind::Ticker).unwrap(), "ticker");
    }

    #[test]
    fn candle_is_unsupported() {
        assert!(matches!(
            channel_name(ChannelKind::Candle),
            Err(MdxError::UnsupportedChannel(ChannelKind::Candle))
        ));
    }
}
