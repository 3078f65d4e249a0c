//! Bitfinex connector.
//!
//! The entry point validates the requested market kind and channels, resolves
//! every pair through the market directory, builds the `{channel × pair}`
//! subscription cross-product, partitions it to respect the per-session
//! subscription cap, and runs one [`Session`] per partition group. All
//! validation failures surface before any network activity.

pub mod book;
pub mod channels;
pub mod normalizer;
pub mod rest;
pub mod symbols;
pub mod ws;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use mdx_core::MdxError;
use mdx_core::config::AppConfig;
use mdx_core::types::{ChannelKind, Market, MarketKind, SubscriptionRequest};
use tracing::{error, info};

use crate::directory::{self, MarketDirectory, StaticDirectory};
use crate::partition;
use crate::session::{Normalizer, Session, SessionConfig, SessionHandle, SessionParams};
use crate::sink::Sink;
use crate::transport::TransportFactory;
use crate::MdConnector;

/// Exchange identity carried by every market record and canonical message.
pub const EXCHANGE: &str = "bitfinex";

/// Public WebSocket endpoint.
pub const WS_URL: &str = "wss://api-pub.bitfinex.com/ws/2";

/// Protocol-level keepalive frame sent by each session's timer.
const PING_FRAME: &str = r#"{"event":"ping"}"#;

/// Factory for production WebSocket transports.
pub fn ws_transport_factory() -> TransportFactory {
    Box::new(|id| Box::new(ws::BitfinexWs::new(WS_URL, id)))
}

/// Build a directory without touching the network, deriving native symbols
/// by rule. Useful offline and in tests; the REST directory ([`rest`]) is
/// authoritative.
pub fn offline_directory(kind: MarketKind, pairs: &[String]) -> Result<StaticDirectory, MdxError> {
    let mut markets = Vec::with_capacity(pairs.len());
    for pair in pairs {
        markets.push(Market {
            exchange: EXCHANGE.to_string(),
            kind,
            pair: pair.clone(),
            native_id: symbols::to_native_symbol(kind, pair)?,
        });
    }
    Ok(StaticDirectory::new(markets))
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// The connector: validated subscription plan plus running sessions.
pub struct BitfinexMd {
    name: String,
    market_kind: MarketKind,
    groups: Vec<Vec<SubscriptionRequest>>,
    markets: Arc<Vec<Market>>,
    session_config: SessionConfig,
    transport_factory: TransportFactory,
    sink: Sink,
    sessions: Vec<SessionHandle>,
}

impl std::fmt::Debug for BitfinexMd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitfinexMd")
            .field("name", &self.name)
            .field("market_kind", &self.market_kind)
            .field("groups", &self.groups)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl BitfinexMd {
    /// Validate the request and build the session plan.
    ///
    /// Fails fast — unsupported market kind, unsupported channel, or an
    /// unresolvable pair abort here, before any session opens.
    pub fn new(
        config: &AppConfig,
        directory: &dyn MarketDirectory,
        transport_factory: TransportFactory,
        sink: Sink,
    ) -> Result<Self, MdxError> {
        if !matches!(config.market_kind, MarketKind::Spot | MarketKind::Swap) {
            return Err(MdxError::UnsupportedMarketKind(config.market_kind));
        }
        if config.subscription_cap() == 0 {
            return Err(MdxError::Config("max_subscriptions must be at least 1".into()));
        }
        for &channel in &config.channels {
            channels::channel_name(channel)?;
        }
        let markets =
            directory::resolve_all(directory, EXCHANGE, config.market_kind, &config.pairs)?;

        // Cross-product, channel-major, pair order preserved.
        let mut requests = Vec::with_capacity(config.channels.len() * config.pairs.len());
        for &channel in &config.channels {
            for pair in &config.pairs {
                requests.push(SubscriptionRequest::new(channel, pair.clone()));
            }
        }
        let groups = partition::partition(requests, config.subscription_cap());

        Ok(Self {
            name: config.module_name(),
            market_kind: config.market_kind,
            groups,
            markets: Arc::new(markets),
            session_config: SessionConfig {
                keepalive_interval: config.keepalive_interval(),
                book_precision: config.book_precision(),
                book_length: config.book_length(),
                ping_frame: PING_FRAME.to_string(),
            },
            transport_factory,
            sink,
            sessions: Vec::new(),
        })
    }

    /// Number of sessions the subscription request spreads across.
    pub fn planned_sessions(&self) -> usize {
        self.groups.len()
    }

    fn make_normalizer() -> Normalizer {
        Arc::new(|market, kind, channel, payload, first| match kind {
            ChannelKind::Trade => normalizer::normalize_trades(market, channel, payload),
            ChannelKind::BestBidOffer | ChannelKind::OrderBook => {
                normalizer::normalize_order_book(market, kind, channel, payload, first)
                    .map(|m| vec![m])
            }
            ChannelKind::Ticker => {
                normalizer::normalize_ticker(market, channel, payload).map(|m| vec![m])
            }
            other => Err(MdxError::UnsupportedChannel(other)),
        })
    }
}

#[async_trait]
impl MdConnector for BitfinexMd {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self) -> Result<()> {
        let groups = std::mem::take(&mut self.groups);
        for (id, assignment) in groups.into_iter().enumerate() {
            let transport = (self.transport_factory)(id);
            let session = Session::new(SessionParams {
                id,
                exchange: EXCHANGE.to_string(),
                market_kind: self.market_kind,
                assignment,
                markets: Arc::clone(&self.markets),
                config: self.session_config.clone(),
                channel_namer: channels::channel_name,
                normalizer: Self::make_normalizer(),
                transport,
                sink: Arc::clone(&self.sink),
            });
            match session.start().await {
                Ok(handle) => self.sessions.push(handle),
                // A faulted transport degrades only its own session.
                Err(e @ MdxError::Transport(_)) => {
                    error!("[{}] session {id} failed to start: {e}", self.name);
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!("[{}] started {} session(s)", self.name, self.sessions.len());
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        for session in self.sessions.drain(..) {
            session.stop().await;
        }
        info!("[{}] stopped", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdx_core::config::SessionSettings;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    use crate::sink::debug_sink;
    use crate::transport::{Transport, TransportEvent};

    struct NullTransport {
        events: Option<mpsc::Receiver<TransportEvent>>,
    }

    impl NullTransport {
        fn new() -> Self {
            // Sender dropped immediately: the event queue reports closed and
            // the session's dispatch task exits on its own.
            let (_tx, rx) = mpsc::channel(1);
            Self { events: Some(rx) }
        }
    }

    #[async_trait]
    impl Transport for NullTransport {
        async fn open(&mut self) -> Result<(), MdxError> {
            Ok(())
        }
        async fn subscribe_trades(&mut self, _symbol: &str) -> Result<(), MdxError> {
            Ok(())
        }
        async fn subscribe_order_book(
            &mut self,
            _symbol: &str,
            _precision: &str,
            _length: u32,
        ) -> Result<(), MdxError> {
            Ok(())
        }
        async fn subscribe_ticker(&mut self, _symbol: &str) -> Result<(), MdxError> {
            Ok(())
        }
        async fn send(&mut self, _frame: String) -> Result<(), MdxError> {
            Ok(())
        }
        fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
            self.events.take()
        }
        async fn close(&mut self) {}
    }

    fn counting_factory() -> (TransportFactory, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let factory_count = Arc::clone(&count);
        let factory: TransportFactory = Box::new(move |_id| {
            factory_count.fetch_add(1, Ordering::SeqCst);
            Box::new(NullTransport::new())
        });
        (factory, count)
    }

    fn app_config(
        kind: MarketKind,
        channels: Vec<ChannelKind>,
        pairs: Vec<&str>,
        cap: usize,
    ) -> AppConfig {
        AppConfig {
            module_name: None,
            log_path: None,
            exchange: EXCHANGE.to_string(),
            market_kind: kind,
            pairs: pairs.into_iter().map(String::from).collect(),
            channels,
            offline_directory: Some(true),
            session: Some(SessionSettings {
                max_subscriptions: Some(cap),
                keepalive_interval_sec: Some(3600),
                book_precision: None,
                book_length: None,
            }),
        }
    }

    #[test]
    fn unsupported_market_kind_fails_fast() {
        let config =
            app_config(MarketKind::Future, vec![ChannelKind::Trade], vec!["BTC/USD"], 30);
        let dir = offline_directory(MarketKind::Spot, &config.pairs).unwrap();
        let (factory, count) = counting_factory();
        let err = BitfinexMd::new(&config, &dir, factory, debug_sink()).unwrap_err();
        assert!(matches!(err, MdxError::UnsupportedMarketKind(MarketKind::Future)));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsupported_channel_fails_before_any_subscription() {
        let config =
            app_config(MarketKind::Spot, vec![ChannelKind::Candle], vec!["BTC/USD"], 30);
        let dir = offline_directory(MarketKind::Spot, &config.pairs).unwrap();
        let (factory, count) = counting_factory();
        let err = BitfinexMd::new(&config, &dir, factory, debug_sink()).unwrap_err();
        assert!(matches!(err, MdxError::UnsupportedChannel(ChannelKind::Candle)));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_pair_fails_before_any_session_opens() {
        let config = app_config(
            MarketKind::Spot,
            vec![ChannelKind::Trade],
            vec!["BTC/USD", "NOPE/USD"],
            30,
        );
        // Directory only knows BTC/USD.
        let dir = offline_directory(MarketKind::Spot, &["BTC/USD".to_string()]).unwrap();
        let (factory, count) = counting_factory();
        let err = BitfinexMd::new(&config, &dir, factory, debug_sink()).unwrap_err();
        assert!(matches!(err, MdxError::MarketNotFound { ref pair, .. } if pair == "NOPE/USD"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cross_product_is_partitioned_into_sessions() {
        let config = app_config(
            MarketKind::Spot,
            vec![ChannelKind::Trade, ChannelKind::Ticker],
            vec!["BTC/USD", "ETH/USD", "LTC/USD"],
            4,
        );
        let dir = offline_directory(MarketKind::Spot, &config.pairs).unwrap();
        let (factory, count) = counting_factory();
        let mut md = BitfinexMd::new(&config, &dir, factory, debug_sink()).unwrap();
        // 2 channels x 3 pairs = 6 requests, cap 4 -> groups of [4, 2].
        assert_eq!(md.planned_sessions(), 2);

        md.start().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        md.stop().await.unwrap();
    }
}
