//! Production transport: WebSocket demultiplexer.
//!
//! Wraps the shared reconnecting WebSocket connection and turns the wire
//! protocol into [`TransportEvent`]s:
//!
//! - `subscribed` acks bind wire channel ids to the pending subscriptions
//! - data frames `[chanId, …]` route by channel id; heartbeats (`"hb"`),
//!   info and pong events never reach the session
//! - book channels are mirrored (snapshot + level updates) so every book
//!   event carries a full `{asks, bids}` view
//! - on reconnect the connection layer replays all subscription frames; the
//!   `info` greeting of the fresh connection resets the routing table and
//!   the mirrors, so the next acks rebind cleanly and the first book emitted
//!   per channel is a fresh snapshot
//!
//! Subscription frames are sent as [`Outbound::Subscribe`] so the connection
//! layer records them for replay.

use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use mdx_core::MdxError;
use mdx_core::ws::{OnTextCallback, Outbound, WsConnConfig, WsConnection};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::book::BookMirror;
use crate::json_util::{level_tuple, parse_u64};
use crate::transport::{Transport, TransportEvent};

/// Inbound event queue depth per connection.
const EVENT_QUEUE_SIZE: usize = 8192;

// ---------------------------------------------------------------------------
// Routing table
// ---------------------------------------------------------------------------

/// A subscription announced but not yet acknowledged.
struct PendingSub {
    channel: String,
    symbol: String,
    length: Option<u32>,
}

/// Stream-specific state for an acknowledged channel.
enum StreamKind {
    Trades,
    Ticker,
    Book { length: u32, mirror: BookMirror },
}

struct LiveChannel {
    symbol: String,
    stream: StreamKind,
}

#[derive(Default)]
struct Router {
    pending: Vec<PendingSub>,
    channels: AHashMap<u64, LiveChannel>,
}

impl Router {
    /// Bind a wire channel id to the matching pending subscription.
    fn activate(&mut self, chan_id: u64, channel: &str, symbol: &str, length: Option<u64>) {
        let idx = self.pending.iter().position(|p| {
            p.channel == channel
                && p.symbol == symbol
                && (p.channel != "book" || p.length.map(u64::from) == length)
        });
        let Some(idx) = idx else {
            warn!("unexpected subscription ack: {channel} {symbol} (chanId={chan_id})");
            return;
        };
        let pending = self.pending.remove(idx);
        let stream = match pending.channel.as_str() {
            "trades" => StreamKind::Trades,
            "ticker" => StreamKind::Ticker,
            _ => {
                let length = pending.length.unwrap_or(1);
                StreamKind::Book { length, mirror: BookMirror::new(length as usize) }
            }
        };
        debug!("channel {chan_id} bound: {channel} {symbol}");
        self.channels.insert(chan_id, LiveChannel { symbol: pending.symbol, stream });
    }

    /// A fresh connection greeted us: every live channel goes back to
    /// pending (with an empty mirror) and will be re-bound by the acks that
    /// follow the subscription replay.
    fn reset(&mut self) {
        for (_, live) in self.channels.drain() {
            let (channel, length) = match live.stream {
                StreamKind::Trades => ("trades", None),
                StreamKind::Ticker => ("ticker", None),
                StreamKind::Book { length, .. } => ("book", Some(length)),
            };
            self.pending.push(PendingSub {
                channel: channel.to_string(),
                symbol: live.symbol,
                length,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Frame handling
// ---------------------------------------------------------------------------

fn forward(tx: &mpsc::Sender<TransportEvent>, event: TransportEvent, what: &str) {
    if tx.try_send(event).is_err() {
        warn!("event queue full, dropping {what}");
    }
}

/// Parse and route one text frame. Runs inside the connection task.
fn handle_frame(
    conn_id: usize,
    text: &str,
    router: &Mutex<Router>,
    tx: &mpsc::Sender<TransportEvent>,
) {
    let v: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return,
    };

    if let Some(obj) = v.as_object() {
        match obj.get("event").and_then(|e| e.as_str()) {
            Some("info") => {
                router.lock().unwrap().reset();
                forward(tx, TransportEvent::Opened, "open notification");
            }
            Some("subscribed") => {
                let Some(chan_id) = parse_u64(obj.get("chanId")) else {
                    warn!("[ws-{conn_id}] subscription ack without chanId: {text}");
                    return;
                };
                let channel = obj.get("channel").and_then(|c| c.as_str()).unwrap_or_default();
                let symbol = obj.get("symbol").and_then(|s| s.as_str()).unwrap_or_default();
                let length = parse_u64(obj.get("len"));
                router.lock().unwrap().activate(chan_id, channel, symbol, length);
            }
            Some("error") => {
                let msg = obj.get("msg").and_then(|m| m.as_str()).unwrap_or("unknown");
                let code = parse_u64(obj.get("code")).unwrap_or(0);
                error!("[ws-{conn_id}] protocol error {code}: {msg}");
                forward(tx, TransportEvent::Errored(format!("{msg} (code {code})")), "error");
            }
            // pong, unsubscribed, conf acks — nothing to route
            _ => {}
        }
        return;
    }

    let Some(arr) = v.as_array() else { return };
    let Some(chan_id) = arr.first().and_then(|c| c.as_u64()) else { return };

    // Heartbeats keep the lower layer honest; sessions never see them.
    if arr.get(1).and_then(|t| t.as_str()) == Some("hb") {
        return;
    }

    let mut router = router.lock().unwrap();
    let Some(live) = router.channels.get_mut(&chan_id) else {
        debug!("[ws-{conn_id}] frame for unknown channel {chan_id}");
        return;
    };

    match &mut live.stream {
        StreamKind::Trades => {
            match arr.get(1) {
                // Execution update: [chanId, "te", [ID, MTS, AMOUNT, PRICE]].
                // The "tu" follow-up repeats the same execution with
                // settlement detail; "te" already covered it.
                Some(tag) if tag.as_str() == Some("te") => {
                    if let Some(exec) = arr.get(2) {
                        forward(
                            tx,
                            TransportEvent::Trade {
                                symbol: live.symbol.clone(),
                                payload: exec.clone(),
                            },
                            "trade",
                        );
                    }
                }
                Some(tag) if tag.as_str() == Some("tu") => {}
                // Snapshot on subscribe: [chanId, [[ID, MTS, AMOUNT, PRICE], …]].
                Some(batch) if batch.is_array() => {
                    forward(
                        tx,
                        TransportEvent::Trade { symbol: live.symbol.clone(), payload: batch.clone() },
                        "trade snapshot",
                    );
                }
                _ => {}
            }
        }
        StreamKind::Ticker => {
            if let Some(snapshot) = arr.get(1).filter(|s| s.is_array()) {
                forward(
                    tx,
                    TransportEvent::Ticker {
                        symbol: live.symbol.clone(),
                        payload: snapshot.clone(),
                    },
                    "ticker",
                );
            }
        }
        StreamKind::Book { length, mirror } => {
            let Some(data) = arr.get(1).and_then(|d| d.as_array()) else { return };
            if data.first().is_some_and(|x| x.is_array()) {
                // Snapshot: array of levels.
                let mut levels = Vec::with_capacity(data.len());
                for raw in data {
                    match level_tuple(raw) {
                        Ok(level) => levels.push(level),
                        Err(e) => {
                            error!("[ws-{conn_id}] dropping book snapshot for channel {chan_id}: {e}");
                            return;
                        }
                    }
                }
                mirror.apply_snapshot(&levels);
            } else {
                match level_tuple(&arr[1]) {
                    Ok((price, count, amount)) => mirror.apply(price, count, amount),
                    Err(e) => {
                        error!("[ws-{conn_id}] dropping book update for channel {chan_id}: {e}");
                        return;
                    }
                }
            }
            forward(
                tx,
                TransportEvent::OrderBook {
                    symbol: live.symbol.clone(),
                    length: *length,
                    payload: mirror.view(),
                },
                "book",
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Transport implementation
// ---------------------------------------------------------------------------

/// WebSocket transport for one session.
pub struct BitfinexWs {
    conn: WsConnection,
    router: Arc<Mutex<Router>>,
    events_tx: Option<mpsc::Sender<TransportEvent>>,
    events_rx: Option<mpsc::Receiver<TransportEvent>>,
}

impl BitfinexWs {
    pub fn new(url: &str, id: usize) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        Self {
            conn: WsConnection::new(WsConnConfig {
                url: url.to_string(),
                extra_headers: Default::default(),
                id,
            }),
            router: Arc::new(Mutex::new(Router::default())),
            events_tx: Some(events_tx),
            events_rx: Some(events_rx),
        }
    }

    fn register(&self, channel: &str, symbol: &str, length: Option<u32>) {
        self.router.lock().unwrap().pending.push(PendingSub {
            channel: channel.to_string(),
            symbol: symbol.to_string(),
            length,
        });
    }

    async fn send_subscribe(&self, frame: String) -> Result<(), MdxError> {
        self.conn
            .send(Outbound::Subscribe(frame))
            .await
            .map_err(|e| MdxError::Transport(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Transport for BitfinexWs {
    async fn open(&mut self) -> Result<(), MdxError> {
        let Some(tx) = self.events_tx.take() else {
            return Ok(()); // already started
        };
        let router = Arc::clone(&self.router);
        let on_text: OnTextCallback =
            Arc::new(move |conn_id, text| handle_frame(conn_id, text, &router, &tx));
        self.conn.start(on_text);
        Ok(())
    }

    async fn subscribe_trades(&mut self, symbol: &str) -> Result<(), MdxError> {
        self.register("trades", symbol, None);
        let frame =
            serde_json::json!({"event": "subscribe", "channel": "trades", "symbol": symbol});
        self.send_subscribe(frame.to_string()).await
    }

    async fn subscribe_order_book(
        &mut self,
        symbol: &str,
        precision: &str,
        length: u32,
    ) -> Result<(), MdxError> {
        self.register("book", symbol, Some(length));
        let frame = serde_json::json!({
            "event": "subscribe",
            "channel": "book",
            "symbol": symbol,
            "prec": precision,
            "freq": "F0",
            "len": length.to_string(),
        });
        self.send_subscribe(frame.to_string()).await
    }

    async fn subscribe_ticker(&mut self, symbol: &str) -> Result<(), MdxError> {
        self.register("ticker", symbol, None);
        let frame =
            serde_json::json!({"event": "subscribe", "channel": "ticker", "symbol": symbol});
        self.send_subscribe(frame.to_string()).await
    }

    async fn send(&mut self, frame: String) -> Result<(), MdxError> {
        self.conn
            .send(Outbound::Frame(frame))
            .await
            .map_err(|e| MdxError::Transport(e.to_string()))
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events_rx.take()
    }

    async fn close(&mut self) {
        self.conn.stop().await;
    }
}
