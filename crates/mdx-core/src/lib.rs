//! # mdx-core
//!
//! Core crate for the MDX market-data connector, providing:
//!
//! - **Types** (`types`) — market/channel enums, market records, canonical messages
//! - **Configuration** (`config`) — JSON config deserialization
//! - **Error types** (`error`) — domain-specific `MdxError` via thiserror
//! - **WebSocket** (`ws`) — WS connection with auto-reconnect + subscription replay
//! - **Time utilities** (`time_util`) — Unix-epoch timestamps
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use error::MdxError;
pub use types::*;
