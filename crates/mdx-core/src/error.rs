//! Typed error definitions for the MDX connector.
//!
//! Provides [`MdxError`] for domain-specific errors that are more informative
//! than plain `anyhow::Error` strings. All variants implement
//! `std::error::Error` via `thiserror`, so they integrate seamlessly with
//! `anyhow::Result`.

use thiserror::Error;

use crate::types::{ChannelKind, MarketKind};

/// Domain-specific errors for the MDX connector.
#[derive(Debug, Error)]
pub enum MdxError {
    /// The requested market kind is not served by this connector.
    #[error("unsupported market kind: {0}")]
    UnsupportedMarketKind(MarketKind),

    /// The exchange does not expose this channel kind.
    #[error("channel '{0}' is not available on this exchange")]
    UnsupportedChannel(ChannelKind),

    /// No market matched a requested `(kind, pair)`, or the match belonged
    /// to a different exchange. Fatal configuration error.
    #[error("no market found for ({kind}, {pair})")]
    MarketNotFound { kind: MarketKind, pair: String },

    /// A raw payload violated the expected shape. Programming-invariant
    /// violation at the normalization boundary, not a recoverable condition.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Transport connection or protocol error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Market directory lookup/fetch error.
    #[error("market directory error: {0}")]
    Directory(String),
}
