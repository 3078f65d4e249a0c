//! Canonical-message sink.
//!
//! Sessions hand every normalized message to a single caller-supplied
//! callback. The callback must not block the session's dispatch task
//! indefinitely; anything queue-backed, file-backed, or socket-backed can sit
//! behind it.

use std::sync::Arc;

use mdx_core::types::CanonicalMessage;
use tracing::debug;

/// Callback invoked once per canonical message, in per-symbol arrival order.
pub type Sink = Arc<dyn Fn(CanonicalMessage) + Send + Sync>;

/// Default sink: writes each message to the debug log.
pub fn debug_sink() -> Sink {
    Arc::new(|msg| debug!(target: "mdx_md::sink", "{msg}"))
}
