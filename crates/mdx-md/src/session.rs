//! Session manager.
//!
//! One session owns one transport connection and the ordered group of
//! subscriptions assigned to it by the partitioner. On open it resolves its
//! assignment against the shared market list, issues the channel-specific
//! subscribe calls, installs a normalization handler per `(symbol, channel)`,
//! and runs a protocol keepalive timer for the session's lifetime.
//!
//! Incoming events are decoupled from transport callback timing: the
//! transport pushes [`TransportEvent`]s into an inbound queue and a dedicated
//! dispatch task drains it, invoking the normalizer and forwarding canonical
//! messages to the sink in per-symbol arrival order.
//!
//! Sessions are independent. A transport fault degrades only its own session
//! (state `Errored`, logged); other sessions keep streaming.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use mdx_core::MdxError;
use mdx_core::types::{CanonicalMessage, ChannelKind, Market, MarketKind, SubscriptionRequest};
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::sink::Sink;
use crate::transport::{Transport, TransportEvent};

/// Depth used for best-bid-offer book subscriptions. Full book subscriptions
/// use the configured depth instead.
const BBO_LENGTH: u32 = 1;

// ---------------------------------------------------------------------------
// Session state machine
// ---------------------------------------------------------------------------

/// Lifecycle of one session.
///
/// `Errored` is reachable from any non-terminal state on transport failure;
/// recovery (reconnect + subscription replay) belongs to the transport, and
/// the session returns to `Streaming` once events flow again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Open,
    Subscribed,
    Streaming,
    Errored,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Subscribed => "subscribed",
            Self::Streaming => "streaming",
            Self::Errored => "errored",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Wiring types
// ---------------------------------------------------------------------------

/// Maps an abstract channel kind to the exchange's wire channel name.
pub type ChannelNamer = fn(ChannelKind) -> Result<&'static str, MdxError>;

/// Converts one raw payload into canonical messages.
///
/// Arguments: resolved market, channel kind, wire channel name, raw payload,
/// and whether this is the first book emission for the symbol.
pub type Normalizer = Arc<
    dyn Fn(
            &Market,
            ChannelKind,
            &str,
            &serde_json::Value,
            bool,
        ) -> Result<Vec<CanonicalMessage>, MdxError>
        + Send
        + Sync,
>;

/// Per-session tuning, passed in explicitly so tests can run with small
/// values.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Keepalive ping period; the exchange silently drops idle sessions.
    pub keepalive_interval: Duration,
    /// Book price-aggregation precision parameter.
    pub book_precision: String,
    /// Depth for full order-book subscriptions.
    pub book_length: u32,
    /// Protocol-level ping frame sent by the keepalive timer.
    pub ping_frame: String,
}

/// Everything needed to start one session.
pub struct SessionParams {
    pub id: usize,
    /// Exchange identity; resolved markets must carry the same name.
    pub exchange: String,
    pub market_kind: MarketKind,
    /// The ordered subscription group this session owns.
    pub assignment: Vec<SubscriptionRequest>,
    /// Shared read-only resolved market list.
    pub markets: Arc<Vec<Market>>,
    pub config: SessionConfig,
    pub channel_namer: ChannelNamer,
    pub normalizer: Normalizer,
    pub transport: Box<dyn Transport>,
    pub sink: Sink,
}

// ---------------------------------------------------------------------------
// Handler table
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct HandlerEntry {
    market: Market,
    channel_kind: ChannelKind,
    channel_name: &'static str,
}

/// Book subscription handler plus its first-snapshot marker. The marker is
/// flipped after the first successful emission and reset only by tearing the
/// session down.
struct BookHandler {
    entry: HandlerEntry,
    snapshot_sent: bool,
}

/// Handlers installed for one native symbol. Book streams are keyed by the
/// subscription depth, which distinguishes a best-bid-offer stream from a
/// full book stream on venues where both share a wire channel.
#[derive(Default)]
struct SymbolHandlers {
    trade: Option<HandlerEntry>,
    ticker: Option<HandlerEntry>,
    books: AHashMap<u32, BookHandler>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A not-yet-started session.
pub struct Session {
    params: SessionParams,
}

impl Session {
    pub fn new(params: SessionParams) -> Self {
        Self { params }
    }

    /// Open the transport, subscribe the assignment, and spawn the keepalive
    /// and dispatch tasks.
    ///
    /// Market resolution failures (`MarketNotFound`) abort before any
    /// subscribe call is issued.
    pub async fn start(self) -> Result<SessionHandle, MdxError> {
        let SessionParams {
            id,
            exchange,
            market_kind,
            assignment,
            markets,
            config,
            channel_namer,
            normalizer,
            mut transport,
            sink,
        } = self.params;

        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);

        info!("[session-{id}] connecting ({} subscriptions)", assignment.len());
        let _ = state_tx.send(SessionState::Connecting);
        transport.open().await?;
        let _ = state_tx.send(SessionState::Open);

        // Resolve the assignment against the shared market list. Absence or
        // an exchange-identity mismatch is a configuration error, surfaced
        // before any subscribe call goes out.
        let mut resolved: Vec<(SubscriptionRequest, Market)> = Vec::with_capacity(assignment.len());
        for req in assignment {
            let market = markets
                .iter()
                .find(|m| m.kind == market_kind && m.pair == req.pair && m.exchange == exchange)
                .cloned()
                .ok_or_else(|| MdxError::MarketNotFound { kind: market_kind, pair: req.pair.clone() })?;
            resolved.push((req, market));
        }

        // Subscribe and install one normalization handler per (symbol, channel).
        let mut handlers: AHashMap<String, SymbolHandlers> = AHashMap::new();
        for (req, market) in resolved {
            let channel_name = channel_namer(req.channel)?;
            let symbol = market.native_id.clone();
            let entry = HandlerEntry { market, channel_kind: req.channel, channel_name };
            let slot = handlers.entry(symbol.clone()).or_default();
            match req.channel {
                ChannelKind::Trade => {
                    transport.subscribe_trades(&symbol).await?;
                    slot.trade = Some(entry);
                }
                ChannelKind::BestBidOffer => {
                    transport
                        .subscribe_order_book(&symbol, &config.book_precision, BBO_LENGTH)
                        .await?;
                    slot.books.insert(BBO_LENGTH, BookHandler { entry, snapshot_sent: false });
                }
                ChannelKind::OrderBook => {
                    transport
                        .subscribe_order_book(&symbol, &config.book_precision, config.book_length)
                        .await?;
                    slot.books
                        .insert(config.book_length, BookHandler { entry, snapshot_sent: false });
                }
                ChannelKind::Ticker => {
                    transport.subscribe_ticker(&symbol).await?;
                    slot.ticker = Some(entry);
                }
                other => return Err(MdxError::UnsupportedChannel(other)),
            }
        }
        let _ = state_tx.send(SessionState::Subscribed);
        info!("[session-{id}] subscribed ({} symbols)", handlers.len());

        let events = transport
            .take_events()
            .ok_or_else(|| MdxError::Transport("transport event queue already taken".into()))?;
        let transport = Arc::new(Mutex::new(transport));

        // Keepalive timer, session-scoped; aborted on stop.
        let ka_transport = Arc::clone(&transport);
        let ping_frame = config.ping_frame.clone();
        let period = config.keepalive_interval;
        let keepalive = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick resolves immediately
            loop {
                ticker.tick().await;
                let mut t = ka_transport.lock().await;
                if let Err(e) = t.send(ping_frame.clone()).await {
                    warn!("[session-{id}] keepalive send failed: {e}");
                }
            }
        });

        // Dispatch task: drains the inbound queue until the transport closes.
        let mut dispatcher = Dispatcher { id, handlers, normalizer, sink, state_tx };
        let dispatch = tokio::spawn(async move {
            let mut events = events;
            while let Some(event) = events.recv().await {
                dispatcher.on_event(event);
            }
            debug!("[session-{id}] event queue closed");
        });

        Ok(SessionHandle { id, state: state_rx, transport, keepalive, dispatch })
    }
}

/// A running session.
pub struct SessionHandle {
    id: usize,
    state: watch::Receiver<SessionState>,
    transport: Arc<Mutex<Box<dyn Transport>>>,
    keepalive: tokio::task::JoinHandle<()>,
    dispatch: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl SessionHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Current state-machine position.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Cancel the keepalive timer, close the transport, and let in-flight
    /// dispatch drain. No partial message is ever emitted.
    pub async fn stop(self) {
        self.keepalive.abort();
        self.transport.lock().await.close().await;
        let _ = self.dispatch.await;
        info!("[session-{}] stopped", self.id);
    }
}

// ---------------------------------------------------------------------------
// Event dispatch
// ---------------------------------------------------------------------------

struct Dispatcher {
    id: usize,
    handlers: AHashMap<String, SymbolHandlers>,
    normalizer: Normalizer,
    sink: Sink,
    state_tx: watch::Sender<SessionState>,
}

impl Dispatcher {
    fn on_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                debug!("[session-{}] transport open", self.id);
            }
            TransportEvent::Errored(e) => {
                error!("[session-{}] transport error: {e}", self.id);
                let _ = self.state_tx.send(SessionState::Errored);
            }
            TransportEvent::Trade { symbol, payload } => {
                let Some(entry) = self.handlers.get(&symbol).and_then(|h| h.trade.as_ref()) else {
                    warn!("[session-{}] trade event for unknown symbol {symbol}", self.id);
                    return;
                };
                Self::emit(&self.normalizer, &self.sink, &self.state_tx, self.id, entry, payload, false);
            }
            TransportEvent::Ticker { symbol, payload } => {
                let Some(entry) = self.handlers.get(&symbol).and_then(|h| h.ticker.as_ref()) else {
                    warn!("[session-{}] ticker event for unknown symbol {symbol}", self.id);
                    return;
                };
                Self::emit(&self.normalizer, &self.sink, &self.state_tx, self.id, entry, payload, false);
            }
            TransportEvent::OrderBook { symbol, length, payload } => {
                let Some(handler) =
                    self.handlers.get_mut(&symbol).and_then(|h| h.books.get_mut(&length))
                else {
                    warn!(
                        "[session-{}] book event for unknown subscription {symbol}@{length}",
                        self.id
                    );
                    return;
                };
                let first = !handler.snapshot_sent;
                let ok = Self::emit(
                    &self.normalizer,
                    &self.sink,
                    &self.state_tx,
                    self.id,
                    &handler.entry,
                    payload,
                    first,
                );
                // The marker flips only once a full snapshot actually reached
                // the sink; a malformed first event does not consume it.
                if ok && first {
                    handler.snapshot_sent = true;
                }
            }
        }
    }

    /// Normalize one payload and forward the results. Returns `false` when
    /// normalization failed (logged, stream continues).
    fn emit(
        normalizer: &Normalizer,
        sink: &Sink,
        state_tx: &watch::Sender<SessionState>,
        id: usize,
        entry: &HandlerEntry,
        payload: serde_json::Value,
        first: bool,
    ) -> bool {
        match normalizer(&entry.market, entry.channel_kind, entry.channel_name, &payload, first) {
            Ok(messages) => {
                if *state_tx.borrow() != SessionState::Streaming {
                    info!("[session-{id}] streaming");
                    let _ = state_tx.send(SessionState::Streaming);
                }
                for msg in messages {
                    sink(msg);
                }
                true
            }
            Err(e) => {
                error!(
                    "[session-{id}] normalization failed for {} ({}): {e}",
                    entry.market.pair, entry.channel_kind
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdx_core::types::{MessageMeta, OrderBookMessage};
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;

    // Scripted transport: events are pre-queued by the test; subscribe and
    // send calls are recorded for assertions.
    struct MockTransport {
        events: Option<mpsc::Receiver<TransportEvent>>,
        subscribes: Arc<StdMutex<Vec<String>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        opened: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(events: mpsc::Receiver<TransportEvent>) -> Self {
            Self {
                events: Some(events),
                subscribes: Arc::new(StdMutex::new(Vec::new())),
                sent: Arc::new(StdMutex::new(Vec::new())),
                opened: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait::async_trait]
    impl Transport for MockTransport {
        async fn open(&mut self) -> Result<(), MdxError> {
            self.opened.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn subscribe_trades(&mut self, symbol: &str) -> Result<(), MdxError> {
            self.subscribes.lock().unwrap().push(format!("trades:{symbol}"));
            Ok(())
        }

        async fn subscribe_order_book(
            &mut self,
            symbol: &str,
            precision: &str,
            length: u32,
        ) -> Result<(), MdxError> {
            self.subscribes.lock().unwrap().push(format!("book:{symbol}:{precision}:{length}"));
            Ok(())
        }

        async fn subscribe_ticker(&mut self, symbol: &str) -> Result<(), MdxError> {
            self.subscribes.lock().unwrap().push(format!("ticker:{symbol}"));
            Ok(())
        }

        async fn send(&mut self, frame: String) -> Result<(), MdxError> {
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }

        fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
            self.events.take()
        }

        async fn close(&mut self) {}
    }

    fn market(pair: &str, native: &str) -> Market {
        Market {
            exchange: "bitfinex".into(),
            kind: MarketKind::Spot,
            pair: pair.into(),
            native_id: native.into(),
        }
    }

    fn namer(_kind: ChannelKind) -> Result<&'static str, MdxError> {
        Ok("book")
    }

    // Stub normalizer: one book message per payload, echoing the first flag.
    fn book_normalizer() -> Normalizer {
        Arc::new(|m, kind, channel, payload, first| {
            Ok(vec![CanonicalMessage::OrderBook(OrderBookMessage {
                meta: MessageMeta {
                    exchange: m.exchange.clone(),
                    market_kind: m.kind,
                    pair: m.pair.clone(),
                    native_id: m.native_id.clone(),
                    channel: channel.to_string(),
                    channel_kind: kind,
                    timestamp_ms: 0,
                    raw: payload.clone(),
                },
                asks: Vec::new(),
                bids: Vec::new(),
                full_snapshot: first,
            })])
        })
    }

    fn config(keepalive: Duration) -> SessionConfig {
        SessionConfig {
            keepalive_interval: keepalive,
            book_precision: "P0".into(),
            book_length: 2,
            ping_frame: r#"{"event":"ping"}"#.into(),
        }
    }

    fn params(
        assignment: Vec<SubscriptionRequest>,
        transport: MockTransport,
        sink: Sink,
        keepalive: Duration,
    ) -> SessionParams {
        SessionParams {
            id: 0,
            exchange: "bitfinex".into(),
            market_kind: MarketKind::Spot,
            assignment,
            markets: Arc::new(vec![market("BTC/USD", "tBTCUSD")]),
            config: config(keepalive),
            channel_namer: namer,
            normalizer: book_normalizer(),
            transport: Box::new(transport),
            sink,
        }
    }

    fn collecting_sink() -> (Sink, Arc<StdMutex<Vec<CanonicalMessage>>>) {
        let store = Arc::new(StdMutex::new(Vec::new()));
        let sink_store = Arc::clone(&store);
        let sink: Sink = Arc::new(move |msg| sink_store.lock().unwrap().push(msg));
        (sink, store)
    }

    async fn wait_for_messages(store: &Arc<StdMutex<Vec<CanonicalMessage>>>, n: usize) {
        for _ in 0..200 {
            if store.lock().unwrap().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {n} messages");
    }

    #[tokio::test]
    async fn first_book_is_full_then_incremental() {
        let (tx, rx) = mpsc::channel(16);
        for _ in 0..3 {
            tx.send(TransportEvent::OrderBook {
                symbol: "tBTCUSD".into(),
                length: 2,
                payload: json!({"asks": [], "bids": []}),
            })
            .await
            .unwrap();
        }
        drop(tx);

        let (sink, store) = collecting_sink();
        let transport = MockTransport::new(rx);
        let session = Session::new(params(
            vec![SubscriptionRequest::new(ChannelKind::OrderBook, "BTC/USD")],
            transport,
            sink,
            Duration::from_secs(3600),
        ));

        let handle = session.start().await.unwrap();
        wait_for_messages(&store, 3).await;

        let flags: Vec<bool> = store
            .lock()
            .unwrap()
            .iter()
            .map(|m| match m {
                CanonicalMessage::OrderBook(b) => b.full_snapshot,
                other => panic!("unexpected message: {other}"),
            })
            .collect();
        assert_eq!(flags, vec![true, false, false]);
        assert_eq!(handle.state(), SessionState::Streaming);
        handle.stop().await;
    }

    #[tokio::test]
    async fn missing_market_aborts_before_subscribing() {
        let (_tx, rx) = mpsc::channel(1);
        let transport = MockTransport::new(rx);
        let subscribes = Arc::clone(&transport.subscribes);
        let (sink, _store) = collecting_sink();
        let session = Session::new(params(
            vec![SubscriptionRequest::new(ChannelKind::Trade, "DOGE/USD")],
            transport,
            sink,
            Duration::from_secs(3600),
        ));

        let err = session.start().await.unwrap_err();
        assert!(matches!(err, MdxError::MarketNotFound { .. }));
        assert!(subscribes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bbo_and_book_use_distinct_depths() {
        let (tx, rx) = mpsc::channel(1);
        let transport = MockTransport::new(rx);
        let subscribes = Arc::clone(&transport.subscribes);
        let (sink, _store) = collecting_sink();
        let session = Session::new(params(
            vec![
                SubscriptionRequest::new(ChannelKind::BestBidOffer, "BTC/USD"),
                SubscriptionRequest::new(ChannelKind::OrderBook, "BTC/USD"),
            ],
            transport,
            sink,
            Duration::from_secs(3600),
        ));

        let handle = session.start().await.unwrap();
        assert_eq!(
            *subscribes.lock().unwrap(),
            vec!["book:tBTCUSD:P0:1".to_string(), "book:tBTCUSD:P0:2".to_string()]
        );
        drop(tx); // lets the dispatch task drain out
        handle.stop().await;
    }

    #[tokio::test]
    async fn transport_error_marks_session_errored() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(TransportEvent::Errored("connection reset".into())).await.unwrap();
        drop(tx);

        let (sink, _store) = collecting_sink();
        let transport = MockTransport::new(rx);
        let session = Session::new(params(
            vec![SubscriptionRequest::new(ChannelKind::OrderBook, "BTC/USD")],
            transport,
            sink,
            Duration::from_secs(3600),
        ));

        let handle = session.start().await.unwrap();
        for _ in 0..200 {
            if handle.state() == SessionState::Errored {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(handle.state(), SessionState::Errored);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_pings_on_schedule() {
        let (tx, rx) = mpsc::channel(1);
        let transport = MockTransport::new(rx);
        let sent = Arc::clone(&transport.sent);
        let (sink, _store) = collecting_sink();
        let session = Session::new(params(
            vec![SubscriptionRequest::new(ChannelKind::OrderBook, "BTC/USD")],
            transport,
            sink,
            Duration::from_secs(30),
        ));

        let handle = session.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(95)).await;
        let frames = sent.lock().unwrap().clone();
        assert!(frames.len() >= 3, "expected >= 3 pings, got {}", frames.len());
        assert!(frames.iter().all(|f| f == r#"{"event":"ping"}"#));
        drop(tx); // lets the dispatch task drain out
        handle.stop().await;
    }
}
