//! Raw payload normalization.
//!
//! Converts the exchange's native payload shapes into canonical messages:
//!
//! - trades: executions `[ID, MTS, AMOUNT, PRICE]`, alone or batched —
//!   negative `AMOUNT` denotes a sell-initiated execution
//! - book: full views `{"asks": [[price, count, amount], …], "bids": …}` —
//!   `count <= 0` tombstones the level
//! - ticker: the 10-element snapshot array
//!
//! All functions are pure aside from stamping the local receive time; the
//! per-symbol first-snapshot flag is session state passed in by the caller.

use mdx_core::MdxError;
use mdx_core::time_util;
use mdx_core::types::{
    CanonicalMessage, ChannelKind, Market, MessageMeta, OrderBookMessage, PriceLevel,
    TickerMessage, TradeMessage,
};

use crate::json_util::{level_tuple, parse_f64, parse_i64, parse_u64};

fn meta(
    market: &Market,
    kind: ChannelKind,
    channel: &str,
    timestamp_ms: u64,
    raw: &serde_json::Value,
) -> MessageMeta {
    MessageMeta {
        exchange: market.exchange.clone(),
        market_kind: market.kind,
        pair: market.pair.clone(),
        native_id: market.native_id.clone(),
        channel: channel.to_string(),
        channel_kind: kind,
        timestamp_ms,
        raw: raw.clone(),
    }
}

// ---------------------------------------------------------------------------
// Trades
// ---------------------------------------------------------------------------

/// Normalize a trade payload: one execution or a batch of executions.
///
/// Batch entries are normalized independently, in arrival order.
pub fn normalize_trades(
    market: &Market,
    channel: &str,
    payload: &serde_json::Value,
) -> Result<Vec<CanonicalMessage>, MdxError> {
    let arr = payload
        .as_array()
        .ok_or_else(|| MdxError::MalformedPayload(format!("trade payload not an array: {payload}")))?;

    if arr.is_empty() {
        return Ok(Vec::new());
    }

    if arr[0].is_array() {
        // Batch (e.g. the snapshot delivered on subscribe).
        let mut out = Vec::with_capacity(arr.len());
        for exec in arr {
            out.push(normalize_execution(market, channel, exec)?);
        }
        Ok(out)
    } else {
        Ok(vec![normalize_execution(market, channel, payload)?])
    }
}

/// Normalize one `[ID, MTS, AMOUNT, PRICE]` execution.
fn normalize_execution(
    market: &Market,
    channel: &str,
    exec: &serde_json::Value,
) -> Result<CanonicalMessage, MdxError> {
    let arr = exec
        .as_array()
        .filter(|a| a.len() == 4)
        .ok_or_else(|| MdxError::MalformedPayload(format!("bad trade execution: {exec}")))?;

    let id = parse_i64(arr.first())
        .ok_or_else(|| MdxError::MalformedPayload(format!("non-numeric trade id: {exec}")))?;
    let mts = parse_u64(arr.get(1))
        .ok_or_else(|| MdxError::MalformedPayload(format!("non-numeric trade time: {exec}")))?;
    let amount = parse_f64(arr.get(2))
        .ok_or_else(|| MdxError::MalformedPayload(format!("non-numeric trade amount: {exec}")))?;
    let price = parse_f64(arr.get(3))
        .ok_or_else(|| MdxError::MalformedPayload(format!("non-numeric trade price: {exec}")))?;

    Ok(CanonicalMessage::Trade(TradeMessage {
        meta: meta(market, ChannelKind::Trade, channel, mts, exec),
        price,
        quantity: amount.abs(),
        sell: amount < 0.0,
        trade_id: id.to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Order book
// ---------------------------------------------------------------------------

/// Normalize a full book view.
///
/// `full_snapshot` is owned by the session: true exactly once per
/// `(session, symbol)` on the first emission.
pub fn normalize_order_book(
    market: &Market,
    kind: ChannelKind,
    channel: &str,
    payload: &serde_json::Value,
    full_snapshot: bool,
) -> Result<CanonicalMessage, MdxError> {
    let asks = payload
        .get("asks")
        .and_then(|v| v.as_array())
        .ok_or_else(|| MdxError::MalformedPayload(format!("book payload missing asks: {payload}")))?;
    let bids = payload
        .get("bids")
        .and_then(|v| v.as_array())
        .ok_or_else(|| MdxError::MalformedPayload(format!("book payload missing bids: {payload}")))?;

    Ok(CanonicalMessage::OrderBook(OrderBookMessage {
        meta: meta(market, kind, channel, time_util::now_ms(), payload),
        asks: normalize_levels(asks)?,
        bids: normalize_levels(bids)?,
        full_snapshot,
    }))
}

fn normalize_levels(levels: &[serde_json::Value]) -> Result<Vec<PriceLevel>, MdxError> {
    levels.iter().map(normalize_level).collect()
}

/// Map one `[price, count, amount]` tuple to a price level.
///
/// `count <= 0` is a tombstone: quantity (and therefore cost) collapse to 0.
fn normalize_level(level: &serde_json::Value) -> Result<PriceLevel, MdxError> {
    let (price, count, amount) = level_tuple(level)?;
    let quantity = if count > 0 { amount.abs() } else { 0.0 };
    Ok(PriceLevel::new(price, quantity))
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Normalize a ticker snapshot array.
///
/// The feed provides no open price and no quote volume; both are reported as
/// `0` so the schema stays uniform across exchanges.
pub fn normalize_ticker(
    market: &Market,
    channel: &str,
    payload: &serde_json::Value,
) -> Result<CanonicalMessage, MdxError> {
    let arr = payload
        .as_array()
        .filter(|a| a.len() >= 10)
        .ok_or_else(|| MdxError::MalformedPayload(format!("bad ticker payload: {payload}")))?;

    let field = |idx: usize, name: &str| {
        parse_f64(arr.get(idx))
            .ok_or_else(|| MdxError::MalformedPayload(format!("non-numeric ticker {name}: {payload}")))
    };

    Ok(CanonicalMessage::Ticker(TickerMessage {
        meta: meta(market, ChannelKind::Ticker, channel, time_util::now_ms(), payload),
        bid: field(0, "bid")?,
        bid_size: field(1, "bid size")?,
        ask: field(2, "ask")?,
        ask_size: field(3, "ask size")?,
        open: 0.0,
        high: field(8, "high")?,
        low: field(9, "low")?,
        close: field(6, "last price")?,
        volume: field(7, "volume")?,
        quote_volume: 0.0,
    }))
}
