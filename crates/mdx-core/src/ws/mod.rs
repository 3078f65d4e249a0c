//! WebSocket connection with auto-reconnect and subscription replay.

pub mod client;

pub use client::{OnTextCallback, Outbound, WsConnConfig, WsConnection};
