//! Transport seam.
//!
//! The connector core never touches sockets directly: a [`Transport`] opens
//! the connection, issues subscribe calls, and pushes [`TransportEvent`]s
//! into an inbound queue that the owning session drains. This decouples
//! transport callback timing from normalizer execution and lets tests drive
//! sessions with a scripted transport.
//!
//! The transport may reconnect autonomously; re-subscription after such a
//! reconnect is the transport's responsibility (see `mdx_core::ws`'s
//! subscription replay).

use async_trait::async_trait;
use mdx_core::MdxError;
use tokio::sync::mpsc;

/// An event pushed by the transport into the session's inbound queue.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The underlying connection is established (also after a reconnect).
    Opened,
    /// Transport-level failure. The session logs it and degrades; recovery
    /// is the transport's own reconnect.
    Errored(String),
    /// Raw trade payload: one execution or a batch of executions.
    Trade { symbol: String, payload: serde_json::Value },
    /// Raw full book view `{"asks": [[price, count, amount], …], "bids": …}`.
    /// `length` echoes the subscription depth so the session can tell a
    /// best-bid-offer stream (length 1) from a full book stream.
    OrderBook { symbol: String, length: u32, payload: serde_json::Value },
    /// Raw ticker snapshot array.
    Ticker { symbol: String, payload: serde_json::Value },
}

/// One transport session: socket lifecycle plus channel subscriptions.
#[async_trait]
pub trait Transport: Send {
    /// Establish the connection. Idempotent.
    async fn open(&mut self) -> Result<(), MdxError>;

    /// Subscribe to the trade stream for a native symbol.
    async fn subscribe_trades(&mut self, symbol: &str) -> Result<(), MdxError>;

    /// Subscribe to the order-book stream for a native symbol with explicit
    /// precision and depth parameters.
    async fn subscribe_order_book(
        &mut self,
        symbol: &str,
        precision: &str,
        length: u32,
    ) -> Result<(), MdxError>;

    /// Subscribe to the ticker stream for a native symbol.
    async fn subscribe_ticker(&mut self, symbol: &str) -> Result<(), MdxError>;

    /// Send a raw protocol frame (keepalive pings).
    async fn send(&mut self, frame: String) -> Result<(), MdxError>;

    /// Take the inbound event queue. Yields `Some` exactly once.
    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>>;

    /// Close the connection and release resources.
    async fn close(&mut self);
}

/// Factory producing one transport per session, keyed by session id.
pub type TransportFactory = Box<dyn Fn(usize) -> Box<dyn Transport> + Send + Sync>;
