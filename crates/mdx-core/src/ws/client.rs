//! Single WebSocket connection managed by a background tokio task.
//!
//! Each `WsConnection` runs a task that:
//! 1. Connects to the exchange WebSocket endpoint (TLS).
//! 2. Replays recorded subscription frames (after a reconnect).
//! 3. Reads text frames and forwards them to a callback.
//! 4. Sends outbound frames queued by the owner.
//! 5. Automatically reconnects on disconnection with exponential backoff.
//!
//! Keepalive pinging is NOT handled here — the owning session runs its own
//! protocol-level keepalive timer and queues ping frames like any other
//! outbound message.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Callback invoked for each received text frame.
///
/// Parameters: `(connection_id, frame_text)`
pub type OnTextCallback = Arc<dyn Fn(usize, &str) + Send + Sync>;

/// An outbound frame, tagged with its reconnect behavior.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Fire-and-forget frame (keepalive pings, one-off commands).
    Frame(String),
    /// Subscription frame — recorded and replayed, in order, after every
    /// reconnect so the stream resumes without the owner's involvement.
    Subscribe(String),
}

/// Configuration for a single WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsConnConfig {
    /// Full WebSocket URL (e.g. `wss://api-pub.bitfinex.com/ws/2`).
    pub url: String,
    /// Extra HTTP headers for the handshake.
    pub extra_headers: HashMap<String, String>,
    /// Connection identifier (unique per session).
    pub id: usize,
}

/// A single WebSocket connection managed by a background tokio task.
pub struct WsConnection {
    /// Connection configuration.
    pub config: WsConnConfig,
    /// Channel to queue outbound frames.
    outbound_tx: Option<mpsc::Sender<Outbound>>,
    /// Shutdown signal sender.
    shutdown_tx: Option<watch::Sender<bool>>,
    /// Task join handle.
    task: Option<tokio::task::JoinHandle<()>>,
}

impl WsConnection {
    /// Create a new (not yet started) connection.
    pub fn new(config: WsConnConfig) -> Self {
        Self { config, outbound_tx: None, shutdown_tx: None, task: None }
    }

    /// Start the connection task. Text frames are forwarded to `on_text`.
    pub fn start(&mut self, on_text: OnTextCallback) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::channel::<Outbound>(64);
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            connection_loop(config, on_text, outbound_rx, shutdown_rx).await;
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.outbound_tx = Some(outbound_tx);
        self.task = Some(task);
    }

    /// Queue an outbound frame on this connection.
    pub async fn send(&self, frame: Outbound) -> anyhow::Result<()> {
        if let Some(tx) = &self.outbound_tx {
            tx.send(frame).await?;
        }
        Ok(())
    }

    /// Stop the connection and wait for the task to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Main connection loop — connects, replays subscriptions, reads, reconnects.
async fn connection_loop(
    config: WsConnConfig,
    on_text: OnTextCallback,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff = Duration::from_millis(100);
    let max_backoff = Duration::from_secs(30);
    let conn_id = config.id;

    // Subscription frames seen so far, replayed in order on each reconnect.
    let mut replay: Vec<String> = Vec::new();

    loop {
        // Check shutdown before connecting
        if *shutdown_rx.borrow() {
            info!("[ws-{conn_id}] shutdown requested");
            return;
        }

        info!("[ws-{conn_id}] connecting to {}", config.url);

        let ws_stream = match connect_ws(&config).await {
            Ok(s) => {
                backoff = Duration::from_millis(100); // reset backoff on success
                info!("[ws-{conn_id}] connected");
                s
            }
            Err(e) => {
                error!("[ws-{conn_id}] connection failed: {e}, retrying in {backoff:?}");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {},
                    _ = shutdown_rx.changed() => return,
                }
                backoff = (backoff * 2).min(max_backoff);
                continue;
            }
        };

        let (mut ws_write, mut ws_read) = ws_stream.split();

        // Replay recorded subscriptions from the previous connection.
        let mut replay_failed = false;
        for frame in &replay {
            debug!("[ws-{conn_id}] replaying subscription: {frame}");
            if let Err(e) = ws_write.send(Message::Text(frame.clone().into())).await {
                error!("[ws-{conn_id}] subscription replay failed: {e}");
                replay_failed = true;
                break;
            }
        }
        if replay_failed {
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {},
                _ = shutdown_rx.changed() => return,
            }
            backoff = (backoff * 2).min(max_backoff);
            continue;
        }

        // Main read/write loop
        loop {
            tokio::select! {
                // Shutdown signal
                _ = shutdown_rx.changed() => {
                    info!("[ws-{conn_id}] shutdown signal received");
                    let _ = ws_write.close().await;
                    return;
                }

                // Incoming message
                msg = ws_read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            on_text(conn_id, &text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = ws_write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("[ws-{conn_id}] received close frame");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("[ws-{conn_id}] read error: {e}");
                            break;
                        }
                        None => {
                            warn!("[ws-{conn_id}] stream ended");
                            break;
                        }
                        _ => {} // Binary, Pong, Frame — ignore
                    }
                }

                // Outbound frame from the owner
                Some(out) = outbound_rx.recv() => {
                    let frame = match out {
                        Outbound::Frame(f) => f,
                        Outbound::Subscribe(f) => {
                            replay.push(f.clone());
                            f
                        }
                    };
                    if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                        error!("[ws-{conn_id}] send error: {e}");
                        break;
                    }
                }
            }
        }

        // Disconnected — will reconnect at the top of the outer loop
        warn!("[ws-{conn_id}] disconnected, reconnecting in {backoff:?}");
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {},
            _ = shutdown_rx.changed() => return,
        }
        backoff = (backoff * 2).min(max_backoff);
    }
}

/// Establish a TLS WebSocket connection.
async fn connect_ws(
    config: &WsConnConfig,
) -> anyhow::Result<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
> {
    use tokio_tungstenite::tungstenite::http::Request;

    let mut request = Request::builder()
        .uri(&config.url)
        .header("Host", extract_host(&config.url));

    for (key, value) in &config.extra_headers {
        request = request.header(key.as_str(), value.as_str());
    }

    let request = request.body(())?;

    let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}

/// Extract the host from a URL string.
fn extract_host(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.host_str().unwrap_or("").to_string())
        .unwrap_or_default()
}
