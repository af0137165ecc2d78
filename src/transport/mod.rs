//! The `transport` module is the boundary with the underlying publish/subscribe
//! medium.
//!
//! A transport session is callback driven: subscribing registers a
//! [`MessageHandler`] route, and the transport invokes that handler on
//! whatever thread calls [`Transport::handle_timeout`]. The `Client` owns one
//! session and drives it from a dedicated thread.
//!
//! Sessions are opened from a provider URL (`protocol://network?options`).
//! The only provider shipped with the crate is `memq`, an in-process queue.

pub mod memq;
pub mod url;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

pub use memq::{MemoryBus, MemqTransport};
pub use url::ProviderUrl;

/// Identifies one callback route registered with a transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId(pub u64);

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport session is closed")]
    SessionClosed,

    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("invalid provider url: {0}")]
    InvalidUrl(String),

    #[error("unknown {0}")]
    UnknownRoute(RouteId),

    #[error("invalid channel name: {0:?}")]
    InvalidChannel(String),

    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("transport rejected the request: {0}")]
    Rejected(String),
}

/// Callback route invoked by a transport for every message it delivers.
///
/// Runs on the transport's thread, so implementations must return quickly and
/// must never wait on application code.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, channel: &str, payload: &[u8]);
}

/// A live transport session.
pub trait Transport: Send + Sync {
    /// Registers `handler` for messages on `channel`.
    fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<RouteId, TransportError>;

    fn unsubscribe(&self, route: RouteId) -> Result<(), TransportError>;

    fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Waits up to `timeout` for one event and dispatches it to the matching
    /// handlers. Returns `Ok(false)` if nothing arrived in time.
    fn handle_timeout(&self, timeout: Duration) -> Result<bool, TransportError>;

    /// Blocks until one event has been dispatched.
    fn handle(&self) -> Result<(), TransportError> {
        loop {
            if self.handle_timeout(Duration::from_secs(1))? {
                return Ok(());
            }
        }
    }

    /// Releases the session. Later calls fail with `SessionClosed`.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Opens a session for `url`.
pub fn open(url: &ProviderUrl) -> Result<Arc<dyn Transport>, TransportError> {
    debug!(%url, "opening transport session");
    match url.protocol() {
        "memq" => {
            let bus = MemoryBus::new();
            Ok(Arc::new(bus.open_with(url)?))
        }
        other => Err(TransportError::UnsupportedProvider(other.to_string())),
    }
}

/// Parses `url` and opens a session for it.
pub fn open_url(url: &str) -> Result<Arc<dyn Transport>, TransportError> {
    open(&ProviderUrl::parse(url)?)
}
